//! Table sources: where the rows of one (risk, time slot) pair come from.

pub mod api;
pub mod browser;

pub use api::ApiSource;
pub use browser::BrowserSource;

use crate::backend::BackendError;
use crate::retry::InteractionFailed;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tally_common::{RiskLevel, Target, TimeSlot};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

impl DateRange {
    /// Both bounds, or nothing.
    pub fn from_parts(from: Option<&str>, to: Option<&str>) -> Option<Self> {
        let from = from.map(str::trim).filter(|s| !s.is_empty())?;
        let to = to.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    pub symbol: String,
    pub strategy: String,
    pub risk: RiskLevel,
    pub slot: TimeSlot,
    pub dates: Option<DateRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Data rows in the table, header excluded.
    pub rows: usize,
    /// Whether a file now exists at the destination.
    pub written: bool,
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Failures that end the whole run.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing credentials (set BTM_EMAIL and BTM_PASSWORD)")]
    MissingCredentials,

    #[error("no csrf_token input on {0}")]
    CsrfTokenMissing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Interaction(#[from] InteractionFailed),

    #[error("login form: {0}")]
    LoginForm(String),

    #[error("login not confirmed: {0}")]
    NotConfirmed(String),

    #[error("no dates available for {0}")]
    NoDates(String),

    #[error("discovery failed: {0}")]
    Discovery(String),
}

/// Failures scoped to a single table; the run goes on.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not set {target} to '{value}': {detail}")]
    Resolution {
        target: Target,
        value: String,
        detail: String,
    },

    #[error("download failed: {0}")]
    Capture(String),

    #[error("no {0} selectors configured")]
    MissingSelectors(Target),

    #[error(transparent)]
    Interaction(#[from] InteractionFailed),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unexpected response: {0}")]
    DataShape(String),

    #[error("no date range for request")]
    MissingDateRange,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Produces the table for one (risk, time slot) pair.
///
/// A source owns its session (cookie jar or browser page) for the run; the
/// harvester calls it strictly sequentially.
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<(), SessionError>;

    /// Full available range for `symbol`, when the source can tell.
    async fn date_range(&self, symbol: &str) -> Result<Option<DateRange>, SessionError>;

    /// Risk levels offered by the live UI, canonicalized, in page order.
    async fn discover_risks(&self) -> Result<Vec<RiskLevel>, SessionError>;

    /// Time slots offered by the live UI, canonicalized, in page order.
    async fn discover_slots(&self) -> Result<Vec<TimeSlot>, SessionError>;

    /// Put the UI into the state `request` describes. Sources that address
    /// tables directly have nothing to do here.
    async fn select(&self, _request: &TableRequest) -> Result<(), SourceError> {
        Ok(())
    }

    /// Produce the table for `request` at `destination`.
    async fn fetch(
        &self,
        request: &TableRequest,
        destination: &Path,
    ) -> Result<FetchOutcome, SourceError>;
}
