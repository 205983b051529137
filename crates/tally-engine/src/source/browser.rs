//! Browser source: the tables are only reachable through the page itself, so
//! each pair means setting two dropdowns and catching a download.

use super::{
    Credentials, DateRange, FetchOutcome, SessionError, SourceError, TableRequest, TableSource,
};
use crate::backend::Backend;
use crate::capture::{CaptureTimeouts, DownloadCapturer};
use crate::config::TallyConfig;
use crate::output::count_csv_rows;
use crate::resolver::Resolver;
use crate::retry::{InteractionFailed, RetryPolicy, with_retry};
use async_trait::async_trait;
use std::path::Path;
use tally_common::{
    OptionMatch, Outcome, RiskLevel, SelectorRegistry, SelectorSpec, Target, TimeSlot,
};
use tracing::{debug, info, warn};

pub struct BrowserSource<'a, B: Backend + ?Sized> {
    backend: &'a B,
    config: &'a TallyConfig,
    registry: SelectorRegistry,
    policy: RetryPolicy,
}

impl<'a, B: Backend + ?Sized> BrowserSource<'a, B> {
    pub fn new(backend: &'a B, config: &'a TallyConfig) -> Self {
        Self {
            backend,
            config,
            registry: config.registry(),
            policy: config.retry_policy(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.site.base_url.trim_end_matches('/'), path)
    }

    fn spec(&self, target: Target) -> Option<&SelectorSpec> {
        self.registry
            .get(target)
            .filter(|spec| !spec.structural_candidates.is_empty() || !spec.text_aliases.is_empty())
    }

    /// Fill the first of `selectors` that accepts input.
    async fn fill_first(
        &self,
        selectors: &[String],
        text: &str,
        field: &str,
    ) -> Result<(), Option<InteractionFailed>> {
        let backend = self.backend;
        let mut last_error = None;

        for selector in selectors {
            let op = format!("fill {} in {}", field, selector);
            match with_retry(&self.policy, &op, move || backend.fill(selector, text)).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error)
    }

    async fn submit_login(&self) -> Result<(), SessionError> {
        let backend = self.backend;
        let login = &self.config.login;
        let mut last_error = None;

        for selector in &login.submit_selectors {
            let op = format!("submit via {}", selector);
            match with_retry(&self.policy, &op, move || backend.click(selector)).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
        for text in &login.submit_texts {
            let op = format!("submit via '{}'", text);
            match with_retry(&self.policy, &op, move || backend.click_text(text)).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .map(SessionError::Interaction)
            .unwrap_or_else(|| SessionError::LoginForm("no submit control configured".into())))
    }

    async fn navigate(&self, url: &str) -> Result<crate::backend::NavigationResult, InteractionFailed> {
        let backend = self.backend;
        let op = format!("navigate to {}", url);
        with_retry(&self.policy, &op, move || backend.navigate(url)).await
    }

    async fn page_options(&self, target: Target) -> Result<Vec<OptionMatch>, SessionError> {
        let spec = self
            .spec(target)
            .ok_or_else(|| SessionError::Discovery(format!("no {} selectors configured", target)))?;
        let backend = self.backend;
        let mut last_error = format!("no {} element found", target);

        for selector in &spec.structural_candidates {
            let op = format!("list options of {}", selector);
            match with_retry(&self.policy, &op, move || backend.list_options(selector)).await {
                Ok(options) if !options.is_empty() => return Ok(options),
                Ok(_) => last_error = format!("{} has no options", selector),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(SessionError::Discovery(last_error))
    }

    async fn fill_dates(&self, dates: &DateRange) -> Result<(), SourceError> {
        let login = &self.config.login;
        for (selectors, value, field) in [
            (&login.date_from_selectors, &dates.from, "start date"),
            (&login.date_to_selectors, &dates.to, "end date"),
        ] {
            if selectors.is_empty() {
                continue;
            }
            if let Err(Some(e)) = self.fill_first(selectors, value, field).await {
                return Err(SourceError::Interaction(e));
            }
        }
        Ok(())
    }

    async fn resolve(
        &self,
        target: Target,
        desired: &str,
        aliases: &[String],
    ) -> Result<(), SourceError> {
        let spec = self.spec(target).ok_or(SourceError::MissingSelectors(target))?;
        let resolution = Resolver::new(self.backend, self.policy)
            .resolve(spec, desired, aliases)
            .await;

        if resolution.is_resolved() {
            Ok(())
        } else {
            Err(SourceError::Resolution {
                target,
                value: desired.to_string(),
                detail: resolution.failure_summary(),
            })
        }
    }
}

#[async_trait]
impl<'a, B: Backend + ?Sized> TableSource for BrowserSource<'a, B> {
    async fn login(&self, credentials: &Credentials) -> Result<(), SessionError> {
        if !credentials.is_complete() {
            return Err(SessionError::MissingCredentials);
        }
        let login = &self.config.login;

        let login_url = self.url(&self.config.site.login_path);
        self.navigate(&login_url).await?;

        self.fill_first(&login.email_selectors, &credentials.email, "email")
            .await
            .map_err(|e| login_field_error(e, "email"))?;
        self.fill_first(&login.password_selectors, &credentials.password, "password")
            .await
            .map_err(|e| login_field_error(e, "password"))?;
        self.submit_login().await?;

        let landing_url = self.url(&self.config.site.landing_path);
        let landing = self.navigate(&landing_url).await?;
        if !landing.is_success() {
            return Err(SessionError::NotConfirmed(format!(
                "{} answered {}",
                landing.url, landing.status
            )));
        }
        if landing.url.ends_with(&self.config.site.login_path) {
            return Err(SessionError::NotConfirmed(format!(
                "redirected back to {}",
                landing.url
            )));
        }

        info!("Logged in, on {}", landing.url);
        Ok(())
    }

    async fn date_range(&self, _symbol: &str) -> Result<Option<DateRange>, SessionError> {
        Ok(None)
    }

    async fn discover_risks(&self) -> Result<Vec<RiskLevel>, SessionError> {
        let mut risks: Vec<RiskLevel> = Vec::new();
        for option in self.page_options(Target::Risk).await? {
            let raw = option
                .value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(option.label.as_str());
            if self.config.is_placeholder(raw) || self.config.is_placeholder(&option.label) {
                continue;
            }
            let risk = RiskLevel::parse(raw);
            if !risks.contains(&risk) {
                risks.push(risk);
            }
        }
        Ok(risks)
    }

    async fn discover_slots(&self) -> Result<Vec<TimeSlot>, SessionError> {
        let mut slots: Vec<TimeSlot> = Vec::new();
        for option in self.page_options(Target::Time).await? {
            if self.config.is_placeholder(&option.label) {
                continue;
            }
            let slot = TimeSlot::parse(&option.label);
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    async fn select(&self, request: &TableRequest) -> Result<(), SourceError> {
        if let Some(dates) = &request.dates {
            self.fill_dates(dates).await?;
        }

        let risk_labels = self.config.risk_labels(&request.risk);
        let desired_risk = risk_labels
            .first()
            .cloned()
            .unwrap_or_else(|| request.risk.display_label());
        self.resolve(Target::Risk, &desired_risk, &risk_labels).await?;

        let slot_labels = request.slot.label_variants();
        self.resolve(Target::Time, &request.slot.display_label(), &slot_labels)
            .await?;

        debug!("Selected {} / {}", request.risk, request.slot);
        Ok(())
    }

    async fn fetch(
        &self,
        _request: &TableRequest,
        destination: &Path,
    ) -> Result<FetchOutcome, SourceError> {
        let spec = self
            .spec(Target::Download)
            .ok_or(SourceError::MissingSelectors(Target::Download))?;
        let capturer = DownloadCapturer::new(
            self.backend,
            self.policy,
            CaptureTimeouts::from_config(self.config),
            self.config.data_extensions.clone(),
        );

        let result = capturer.capture(spec, destination).await;
        if let Outcome::Failure(cause) = result.outcome {
            return Err(SourceError::Capture(cause));
        }

        // Unreadable or row-less captures are not kept at the destination.
        let rows = match count_csv_rows(destination) {
            Ok(rows) => rows,
            Err(e) => {
                remove_capture(destination).await;
                return Err(e.into());
            }
        };
        if rows == 0 && !self.config.output.write_empty {
            remove_capture(destination).await;
            return Ok(FetchOutcome {
                rows,
                written: false,
            });
        }
        Ok(FetchOutcome {
            rows,
            written: true,
        })
    }
}

async fn remove_capture(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

fn login_field_error(error: Option<InteractionFailed>, field: &str) -> SessionError {
    match error {
        Some(e) => SessionError::Interaction(e),
        None => SessionError::LoginForm(format!("no {} field configured", field)),
    }
}
