//! Direct JSON source: CSRF form login over a cookie-keeping HTTP client, then
//! one GET per table against the backtest endpoint.

use super::{
    Credentials, DateRange, FetchOutcome, SessionError, SourceError, TableRequest, TableSource,
};
use crate::capture::partial_path;
use crate::config::TallyConfig;
use crate::table::{self, Table};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::path::Path;
use tally_common::{OptionMatch, RiskLevel, TimeSlot};
use tracing::{debug, info};
use url::Url;

pub struct ApiSource {
    client: Client,
    base: Url,
    config: TallyConfig,
}

impl ApiSource {
    pub fn new(config: &TallyConfig) -> Result<Self, SessionError> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(config.site.user_agent.clone())
            .timeout(config.timeouts.request())
            .build()?;
        let base = Url::parse(config.site.base_url.trim_end_matches('/'))?;

        Ok(Self {
            client,
            base,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    async fn get_html(&self, path: &str) -> Result<String, SessionError> {
        let url = self.endpoint(path)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn landing_options(&self, id: &str) -> Result<Vec<OptionMatch>, SessionError> {
        let html = self.get_html(&self.config.site.landing_path).await?;
        Ok(select_options(&html, id))
    }
}

#[async_trait]
impl TableSource for ApiSource {
    async fn login(&self, credentials: &Credentials) -> Result<(), SessionError> {
        if !credentials.is_complete() {
            return Err(SessionError::MissingCredentials);
        }

        let login_url = self.endpoint(&self.config.site.login_path)?;
        let login_page = self.get_html(&self.config.site.login_path).await?;
        let token =
            csrf_token(&login_page).ok_or_else(|| SessionError::CsrfTokenMissing(login_url.to_string()))?;
        debug!("Got CSRF token from {}", login_url);

        self.client
            .post(login_url)
            .form(&[
                ("email", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
                ("csrf_token", token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        // The landing page only answers for a logged-in session.
        self.get_html(&self.config.site.landing_path).await?;
        info!("Logged in to {}", self.base);
        Ok(())
    }

    async fn date_range(&self, symbol: &str) -> Result<Option<DateRange>, SessionError> {
        let url = self.endpoint(&self.config.site.dates_path)?;
        let payload: Value = self
            .client
            .get(url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let dates = available_dates(payload);
        match (dates.first(), dates.last()) {
            (Some(from), Some(to)) => Ok(Some(DateRange {
                from: from.clone(),
                to: to.clone(),
            })),
            _ => Err(SessionError::NoDates(symbol.to_string())),
        }
    }

    async fn discover_risks(&self) -> Result<Vec<RiskLevel>, SessionError> {
        let mut risks: Vec<RiskLevel> = Vec::new();
        for option in self.landing_options("risk").await? {
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
        for option in self.landing_options("timeHour").await? {
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

    async fn fetch(
        &self,
        request: &TableRequest,
        destination: &Path,
    ) -> Result<FetchOutcome, SourceError> {
        let dates = request
            .dates
            .as_ref()
            .ok_or(SourceError::MissingDateRange)?;
        let url = self.endpoint(&self.config.site.data_path)?;

        let payload: Value = self
            .client
            .get(url)
            .query(&[
                ("desde", dates.from.as_str()),
                ("hasta", dates.to.as_str()),
                ("symbol", request.symbol.as_str()),
                ("estrategia", request.strategy.as_str()),
                ("hora", request.slot.as_str()),
                ("risk", request.risk.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows = payload_rows(payload)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if rows.is_empty() {
            let written = self.config.output.write_empty;
            if written {
                tokio::fs::write(destination, b"").await?;
            }
            return Ok(FetchOutcome { rows: 0, written });
        }

        let table = Table::from_rows(&rows, true).map_err(SourceError::DataShape)?;
        let partial = partial_path(destination);
        let written = match table.write_csv(&partial) {
            Ok(()) => tokio::fs::rename(&partial, destination).await.map_err(SourceError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        debug!("Wrote {} rows to {}", table.len(), destination.display());

        Ok(FetchOutcome {
            rows: table.len(),
            written: true,
        })
    }
}

/// Rows of the backtest payload: a bare list, or an object with a `data` list.
fn payload_rows(payload: Value) -> Result<Vec<Value>, SourceError> {
    match payload {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(SourceError::DataShape(format!(
                "'data' is {}, expected a list",
                table::kind(&other)
            ))),
            None => Err(SourceError::DataShape(
                "object without a 'data' list".to_string(),
            )),
        },
        other => Err(SourceError::DataShape(format!(
            "payload is {}, expected a list",
            table::kind(&other)
        ))),
    }
}

/// Sorted, de-duplicated dates from a list or `{"data": [...]}` response.
fn available_dates(payload: Value) -> Vec<String> {
    let list = match payload {
        Value::Array(list) => list,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(list)) => list,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let mut dates: Vec<String> = list
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

fn csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("input[name='csrf_token']").ok()?;
    document
        .select(&selector)
        .find_map(|input| input.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Options of the dropdown with id `name`, falling back to `select[name=...]`.
fn select_options(html: &str, name: &str) -> Vec<OptionMatch> {
    let document = Html::parse_document(html);
    let Ok(option_selector) = Selector::parse("option") else {
        return Vec::new();
    };

    let container = [format!("#{}", name), format!("select[name='{}']", name)]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| document.select(&selector).next());

    let Some(container) = container else {
        return Vec::new();
    };

    container
        .select(&option_selector)
        .map(|option| OptionMatch {
            label: option.text().collect::<String>().trim().to_string(),
            value: option.value().attr("value").map(|v| v.trim().to_string()),
        })
        .collect()
}
