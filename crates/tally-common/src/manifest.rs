use crate::slot::{RiskLevel, TimeSlot};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    Ok,
    Empty,
    Skipped,
    Error(String),
}

impl ManifestStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, ManifestStatus::Error(_))
    }
}

impl fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestStatus::Ok => f.write_str("ok"),
            ManifestStatus::Empty => f.write_str("empty"),
            ManifestStatus::Skipped => f.write_str("skipped"),
            ManifestStatus::Error(detail) => write!(f, "error:{}", detail),
        }
    }
}

impl Serialize for ManifestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row of the run ledger. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestRecord {
    pub risk: RiskLevel,
    pub hour: TimeSlot,
    pub file: PathBuf,
    pub rows: Option<usize>,
    pub status: ManifestStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    pub ok: usize,
    pub empty: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl fmt::Display for ManifestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok={} empty={} skipped={} errors={}",
            self.ok, self.empty, self.skipped, self.errors
        )
    }
}

/// Append-only ledger of a run, in iteration order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    records: Vec<ManifestRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ManifestRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> ManifestSummary {
        let mut summary = ManifestSummary::default();
        for record in &self.records {
            match record.status {
                ManifestStatus::Ok => summary.ok += 1,
                ManifestStatus::Empty => summary.empty += 1,
                ManifestStatus::Skipped => summary.skipped += 1,
                ManifestStatus::Error(_) => summary.errors += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ManifestStatus) -> ManifestRecord {
        ManifestRecord {
            risk: RiskLevel::parse("conservador"),
            hour: TimeSlot::parse("09:40"),
            file: PathBuf::from("data/x.csv"),
            rows: None,
            status,
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ManifestStatus::Ok.to_string(), "ok");
        assert_eq!(ManifestStatus::Empty.to_string(), "empty");
        assert_eq!(ManifestStatus::Skipped.to_string(), "skipped");
        assert_eq!(
            ManifestStatus::Error("timeout".into()).to_string(),
            "error:timeout"
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut manifest = Manifest::new();
        manifest.push(record(ManifestStatus::Ok));
        manifest.push(record(ManifestStatus::Ok));
        manifest.push(record(ManifestStatus::Skipped));
        manifest.push(record(ManifestStatus::Error("boom".into())));

        let summary = manifest.summary();
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.empty, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.to_string(), "ok=2 empty=0 skipped=1 errors=1");
    }

    #[test]
    fn test_record_serializes_status_as_text() {
        let json = serde_json::to_value(record(ManifestStatus::Error("no csv".into()))).unwrap();
        assert_eq!(json["status"], "error:no csv");
        assert_eq!(json["hour"], "0940");
        assert!(json["rows"].is_null());
    }
}
