//! Resilient dropdown resolution.
//!
//! The same logical dropdown may be a native `<select>` on one deployment and
//! a script-driven widget on another, with labels in Spanish or English. The
//! resolver walks [`Strategy::ORDER`] from the most precise interaction to the
//! loosest and stops at the first one that works. Every backend call goes
//! through [`with_retry`].

use crate::backend::Backend;
use crate::retry::{RetryPolicy, with_retry};
use tally_common::{InteractionAttempt, Outcome, SelectorSpec, Strategy, Target};
use tracing::{debug, info};

/// Every strategy tried for one target, in order.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub target: Target,
    pub attempts: Vec<InteractionAttempt>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.strategy().is_some()
    }

    /// The strategy that succeeded, if any.
    pub fn strategy(&self) -> Option<Strategy> {
        self.attempts
            .iter()
            .find(|a| a.outcome.is_success())
            .map(|a| a.strategy)
    }

    /// One line per failed strategy, for logs and manifest rows.
    pub fn failure_summary(&self) -> String {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                Outcome::Failure(cause) => Some(format!("{}: {}", a.strategy, cause)),
                Outcome::Success => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct Resolver<'a, B: Backend + ?Sized> {
    backend: &'a B,
    policy: RetryPolicy,
}

impl<'a, B: Backend + ?Sized> Resolver<'a, B> {
    pub fn new(backend: &'a B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Try to set `spec.target` to `desired`, falling back through `aliases`
    /// (alternative labels of the same value, in preference order).
    pub async fn resolve(&self, spec: &SelectorSpec, desired: &str, aliases: &[String]) -> Resolution {
        let mut attempts = Vec::new();

        for strategy in Strategy::ORDER {
            let outcome = match self.attempt(strategy, spec, desired, aliases).await {
                Ok(()) => Outcome::Success,
                Err(cause) => Outcome::Failure(cause),
            };

            let resolved = outcome.is_success();
            if resolved {
                info!("{} set to '{}' via {}", spec.target, desired, strategy);
            } else {
                debug!("{} '{}': {} did not apply", spec.target, desired, strategy);
            }
            attempts.push(InteractionAttempt {
                target: spec.target,
                strategy,
                outcome,
            });
            if resolved {
                break;
            }
        }

        Resolution {
            target: spec.target,
            attempts,
        }
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        spec: &SelectorSpec,
        desired: &str,
        aliases: &[String],
    ) -> Result<(), String> {
        match strategy {
            Strategy::NativeSelectByLabel => self.native_select_by_label(spec, desired).await,
            Strategy::NativeSelectByAlias => self.native_select_by_alias(spec, aliases).await,
            Strategy::CustomClickOpenThenText => self.open_then_click_text(spec, desired).await,
            Strategy::DirectTextClick => self.direct_text_click(spec, aliases).await,
        }
    }

    async fn native_select_by_label(&self, spec: &SelectorSpec, desired: &str) -> Result<(), String> {
        let backend = self.backend;
        let mut last_error = no_candidates(spec);

        for selector in &spec.structural_candidates {
            let op = format!("select label '{}' in {}", desired, selector);
            match with_retry(&self.policy, &op, move || {
                backend.select_by_label(selector, desired)
            })
            .await
            {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(last_error)
    }

    async fn native_select_by_alias(&self, spec: &SelectorSpec, aliases: &[String]) -> Result<(), String> {
        if aliases.is_empty() {
            return Err("no aliases to try".to_string());
        }
        let backend = self.backend;
        let mut last_error = no_candidates(spec);

        for selector in &spec.structural_candidates {
            for alias in aliases {
                let op = format!("find option '{}' in {}", alias, selector);
                let found = match with_retry(&self.policy, &op, move || {
                    backend.find_option(selector, alias)
                })
                .await
                {
                    Ok(found) => found,
                    Err(e) => {
                        // Element unusable; move on to the next candidate.
                        last_error = e.to_string();
                        break;
                    }
                };

                let Some(option) = found else {
                    last_error = format!("no option matching '{}' in {}", alias, selector);
                    continue;
                };

                let result = match option.value.as_deref().filter(|v| !v.is_empty()) {
                    Some(value) => {
                        let op = format!("select value '{}' in {}", value, selector);
                        with_retry(&self.policy, &op, move || {
                            backend.select_by_value(selector, value)
                        })
                        .await
                    }
                    None => {
                        let label = option.label.as_str();
                        let op = format!("select label '{}' in {}", label, selector);
                        with_retry(&self.policy, &op, move || {
                            backend.select_by_label(selector, label)
                        })
                        .await
                    }
                };

                match result {
                    Ok(()) => return Ok(()),
                    Err(e) => last_error = e.to_string(),
                }
            }
        }
        Err(last_error)
    }

    async fn open_then_click_text(&self, spec: &SelectorSpec, desired: &str) -> Result<(), String> {
        self.open_widget(spec).await?;
        self.click_text(desired).await
    }

    async fn direct_text_click(&self, spec: &SelectorSpec, aliases: &[String]) -> Result<(), String> {
        if aliases.is_empty() {
            return Err("no aliases to try".to_string());
        }
        let mut last_error = String::new();

        for alias in aliases {
            // Opening is best effort: some widgets render their options inline.
            if let Err(e) = self.open_widget(spec).await {
                debug!("{} widget did not open: {}", spec.target, e);
            }
            match self.click_text(alias).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Click the widget open, by locator first and then by its caption text.
    async fn open_widget(&self, spec: &SelectorSpec) -> Result<(), String> {
        let backend = self.backend;
        let mut last_error = no_candidates(spec);

        for selector in &spec.structural_candidates {
            let op = format!("open {}", selector);
            match with_retry(&self.policy, &op, move || backend.click(selector)).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
        }
        for caption in &spec.text_aliases {
            let op = format!("open '{}'", caption);
            match with_retry(&self.policy, &op, move || backend.click_text(caption)).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(last_error)
    }

    async fn click_text(&self, text: &str) -> Result<(), String> {
        let backend = self.backend;
        let op = format!("click text '{}'", text);
        with_retry(&self.policy, &op, move || backend.click_text(text))
            .await
            .map_err(|e| e.to_string())
    }
}

fn no_candidates(spec: &SelectorSpec) -> String {
    format!("no structural candidates for {}", spec.target)
}
