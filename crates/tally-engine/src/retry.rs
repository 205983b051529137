//! Bounded retry with a fixed pause between attempts.
//!
//! Page elements appear late, dropdowns re-render and downloads start slowly,
//! so every single UI step goes through [`with_retry`]. The delay is fixed;
//! exhausting the attempts is an ordinary strategy failure for the caller.

use std::future::Future;
use std::time::Duration;
use tally_common::BackendError;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// No pause between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {cause}")]
pub struct InteractionFailed {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub cause: BackendError,
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// Errors from all but the last attempt are logged and dropped; the last one is
/// returned as [`InteractionFailed`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, InteractionFailed>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(cause) if attempt >= max_attempts => {
                return Err(InteractionFailed {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    cause,
                });
            }
            Err(cause) => {
                debug!(
                    "{} failed (attempt {}/{}): {}; retrying",
                    operation_name, attempt, max_attempts, cause
                );
                attempt += 1;
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
}
