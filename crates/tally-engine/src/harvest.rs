//! Session orchestration: log in, settle the work list, then walk every
//! (risk, time slot) pair and keep a ledger of what happened to each.

use crate::output::{self, MANIFEST_FILE};
use crate::source::{
    Credentials, DateRange, FetchOutcome, SessionError, SourceError, TableRequest, TableSource,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_common::{Manifest, ManifestRecord, ManifestStatus, ManifestSummary, RiskLevel, TimeSlot};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A user-supplied list, or `auto` to read it from the live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSpec {
    Auto,
    Explicit(Vec<String>),
}

impl ListSpec {
    /// `""`, `auto` and `all` mean [`ListSpec::Auto`]; anything else is a
    /// comma-separated list.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if matches!(trimmed.to_lowercase().as_str(), "" | "auto" | "all") {
            return ListSpec::Auto;
        }
        let items: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if items.is_empty() {
            ListSpec::Auto
        } else {
            ListSpec::Explicit(items)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestPlan {
    pub symbol: String,
    pub strategy: String,
    pub risks: ListSpec,
    pub hours: ListSpec,
    pub dates: Option<DateRange>,
    pub out_base: PathBuf,
    pub overwrite: bool,
    pub pause: Duration,
}

impl HarvestPlan {
    pub fn new(symbol: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
            risks: ListSpec::Auto,
            hours: ListSpec::Auto,
            dates: None,
            out_base: PathBuf::from("data"),
            overwrite: false,
            pause: Duration::from_millis(100),
        }
    }

    pub fn run_dir(&self) -> PathBuf {
        output::run_dir(&self.out_base, &self.symbol, &self.strategy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    Ready,
    ConfiguringTarget,
    Selecting,
    Downloading,
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::LoggedOut => "LOGGED_OUT",
            SessionState::LoggingIn => "LOGGING_IN",
            SessionState::Ready => "READY",
            SessionState::ConfiguringTarget => "CONFIGURING_TARGET",
            SessionState::Selecting => "SELECTING",
            SessionState::Downloading => "DOWNLOADING",
            SessionState::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("session failed: {0}")]
    Session(#[from] SessionError),

    #[error("cannot write manifest {}: {cause}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        cause: csv::Error,
    },
}

#[derive(Debug)]
pub struct HarvestReport {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub summary: ManifestSummary,
    pub dates: Option<DateRange>,
}

pub struct Harvester<S: TableSource> {
    source: S,
    plan: HarvestPlan,
    state: SessionState,
}

impl<S: TableSource> Harvester<S> {
    pub fn new(source: S, plan: HarvestPlan) -> Self {
        Self {
            source,
            plan,
            state: SessionState::LoggedOut,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn transition(&mut self, next: SessionState) {
        match next {
            SessionState::ConfiguringTarget | SessionState::Selecting | SessionState::Downloading => {
                debug!("Session {} -> {}", self.state, next)
            }
            _ => info!("Session {} -> {}", self.state, next),
        }
        self.state = next;
    }

    /// Run the whole harvest. Only session failures abort; every pair ends up
    /// as exactly one manifest record.
    pub async fn run(&mut self, credentials: &Credentials) -> Result<HarvestReport, HarvestError> {
        info!(
            "Harvesting {} / {} into {}",
            self.plan.symbol,
            self.plan.strategy,
            self.plan.out_base.display()
        );

        self.transition(SessionState::LoggingIn);
        self.source.login(credentials).await?;
        self.transition(SessionState::Ready);

        let dates = match &self.plan.dates {
            Some(dates) => Some(dates.clone()),
            None => self.source.date_range(&self.plan.symbol).await?,
        };
        if let Some(dates) = &dates {
            info!("Date range {} -> {}", dates.from, dates.to);
        }

        let risks = self.risks().await?;
        let slots = self.slots().await?;
        info!(
            "{} risk level(s) x {} time slot(s)",
            risks.len(),
            slots.len()
        );

        let run_dir = self.plan.run_dir();
        let mut manifest = Manifest::new();

        for risk in &risks {
            for slot in &slots {
                let request = TableRequest {
                    symbol: self.plan.symbol.clone(),
                    strategy: self.plan.strategy.clone(),
                    risk: risk.clone(),
                    slot: slot.clone(),
                    dates: dates.clone(),
                };
                let (record, attempted) = self.harvest_pair(&run_dir, &request).await;
                manifest.push(record);

                if attempted && !self.plan.pause.is_zero() {
                    tokio::time::sleep(self.plan.pause).await;
                }
            }
        }

        self.transition(SessionState::Done);
        let manifest_path = run_dir.join(MANIFEST_FILE);
        output::write_manifest(&manifest_path, &manifest).map_err(|cause| HarvestError::Manifest {
            path: manifest_path.clone(),
            cause,
        })?;

        let summary = manifest.summary();
        info!("Summary: {} (manifest {})", summary, manifest_path.display());

        Ok(HarvestReport {
            manifest,
            manifest_path,
            summary,
            dates,
        })
    }

    async fn risks(&self) -> Result<Vec<RiskLevel>, SessionError> {
        let risks: Vec<RiskLevel> = match &self.plan.risks {
            ListSpec::Explicit(items) => items.iter().map(|r| RiskLevel::parse(r)).collect(),
            ListSpec::Auto => self.source.discover_risks().await?,
        };
        let risks = dedupe(risks);
        if risks.is_empty() {
            return Err(SessionError::Discovery("no risk levels found".into()));
        }
        Ok(risks)
    }

    async fn slots(&self) -> Result<Vec<TimeSlot>, SessionError> {
        let slots: Vec<TimeSlot> = match &self.plan.hours {
            ListSpec::Explicit(items) => items.iter().map(|h| TimeSlot::parse(h)).collect(),
            ListSpec::Auto => self.source.discover_slots().await?,
        };
        let slots = dedupe(slots);
        if slots.is_empty() {
            return Err(SessionError::Discovery("no time slots found".into()));
        }
        Ok(slots)
    }

    /// One pair, one record. The flag tells whether the source was touched.
    async fn harvest_pair(&mut self, run_dir: &Path, request: &TableRequest) -> (ManifestRecord, bool) {
        self.transition(SessionState::ConfiguringTarget);
        let path = output::table_path(run_dir, request);
        let record = |rows, status| ManifestRecord {
            risk: request.risk.clone(),
            hour: request.slot.clone(),
            file: path.clone(),
            rows,
            status,
        };

        if !self.plan.overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!("Skipping {}: already exists", path.display());
            return (record(None, ManifestStatus::Skipped), false);
        }

        match self.fetch(request, &path).await {
            Ok(FetchOutcome { rows: 0, written }) => {
                if written {
                    warn!("Empty: {} {} -> {}", request.risk, request.slot, path.display());
                } else {
                    warn!("Empty: {} {} (no file written)", request.risk, request.slot);
                }
                (record(Some(0), ManifestStatus::Empty), true)
            }
            Ok(FetchOutcome { rows, .. }) => {
                info!("{} {}: {} row(s) -> {}", request.risk, request.slot, rows, path.display());
                (record(Some(rows), ManifestStatus::Ok), true)
            }
            Err(e) => {
                warn!("Error {} {}: {}", request.risk, request.slot, e);
                (record(None, ManifestStatus::Error(e.to_string())), true)
            }
        }
    }

    async fn fetch(&mut self, request: &TableRequest, path: &Path) -> Result<FetchOutcome, SourceError> {
        self.transition(SessionState::Selecting);
        self.source.select(request).await?;
        self.transition(SessionState::Downloading);
        self.source.fetch(request, path).await
    }
}

fn dedupe<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}
