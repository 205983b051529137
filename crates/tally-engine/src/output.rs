//! Output tree layout and the manifest file.
//!
//! ```text
//! <out>/<SYMBOL>/<Strategy>/manifest.csv
//! <out>/<SYMBOL>/<Strategy>/<risk>/table_<SYMBOL>_<Strategy>_<risk>_<HHMM>[_<from>_<to>].csv
//! ```

use crate::source::TableRequest;
use std::path::{Path, PathBuf};
use tally_common::Manifest;

pub const MANIFEST_FILE: &str = "manifest.csv";

/// `<out>/<SYMBOL>/<Strategy>`
pub fn run_dir(out_base: &Path, symbol: &str, strategy: &str) -> PathBuf {
    out_base.join(symbol).join(strategy)
}

pub fn table_file_name(request: &TableRequest) -> String {
    let mut name = format!(
        "table_{}_{}_{}_{}",
        request.symbol,
        strip_whitespace(&request.strategy),
        strip_whitespace(request.risk.as_str()),
        request.slot
    );
    if let Some(dates) = &request.dates {
        name.push_str(&format!("_{}_{}", dates.from, dates.to));
    }
    name.push_str(".csv");
    name
}

pub fn table_path(run_dir: &Path, request: &TableRequest) -> PathBuf {
    run_dir
        .join(request.risk.as_str())
        .join(table_file_name(request))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Write the manifest as `risk,hour,file,rows,status`.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    if manifest.is_empty() {
        writer.write_record(["risk", "hour", "file", "rows", "status"])?;
    }
    for record in manifest.records() {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Data rows of a CSV file with a header line.
pub fn count_csv_rows(path: &Path) -> Result<usize, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        if record.iter().any(|field| !field.trim().is_empty()) {
            rows += 1;
        }
    }
    Ok(rows)
}
