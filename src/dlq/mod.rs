//! Bad-records log.
//!
//! Records that fail validation (or hit per-record sink failures) are
//! appended to a dated JSON Lines file, one entry per line, instead of
//! being dropped silently. The log is append-only and written regardless
//! of other sink success or failure; errors here are diagnostic and
//! never block the pipeline's state update.

use chrono::NaiveDate;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DlqAppendSnafu, DlqError, DlqOpenSnafu, DlqSerializeSnafu};
use crate::record::BadRecord;

/// Append-only log of records that failed validation or loading.
pub struct BadRecordLog {
    path: PathBuf,
    buffer: Vec<BadRecord>,
    counts: BTreeMap<String, usize>,
    total: usize,
}

impl BadRecordLog {
    /// Create a log at `{dir}/bad_records_{YYYYMMDD}.jsonl`.
    pub fn new(dir: &Path, run_date: NaiveDate) -> Self {
        Self {
            path: dir.join(format!("bad_records_{}.jsonl", run_date.format("%Y%m%d"))),
            buffer: Vec::new(),
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    /// Where the log is written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records logged so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Queue a bad record for the next flush.
    pub fn record(&mut self, record: BadRecord) {
        debug!(
            source = %record.source,
            violations = record.violations.len(),
            "Recording bad record"
        );
        *self.counts.entry(record.source.clone()).or_default() += 1;
        self.total += 1;
        self.buffer.push(record);
    }

    /// Append buffered records to the log file.
    pub fn flush(&mut self) -> Result<(), DlqError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(DlqOpenSnafu {
                path: self.path.clone(),
            })?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(DlqOpenSnafu {
                path: self.path.clone(),
            })?;

        for record in self.buffer.drain(..) {
            let line = serde_json::to_string(&record).context(DlqSerializeSnafu)?;
            writeln!(file, "{line}").context(DlqAppendSnafu {
                path: self.path.clone(),
            })?;
        }

        Ok(())
    }

    /// Flush remaining records and log a per-source summary.
    pub fn finalize(mut self) -> Result<usize, DlqError> {
        self.flush()?;
        if self.total > 0 {
            let by_source: Vec<String> = self
                .counts
                .iter()
                .map(|(source, count)| format!("{source}={count}"))
                .collect();
            info!(
                total = self.total,
                by_source = %by_source.join(", "),
                path = %self.path.display(),
                "Bad records logged"
            );
        }
        Ok(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn bad(source: &str) -> BadRecord {
        BadRecord::new(
            source,
            json!({"product_id": "P1"}),
            vec!["price must be non-negative".to_string()],
        )
    }

    #[test]
    fn test_log_appends_one_json_object_per_line() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = BadRecordLog::new(temp_dir.path(), date("2024-01-01"));
        log.record(bad("products_csv"));
        log.record(bad("inventory_json"));
        let total = log.finalize().unwrap();

        assert_eq!(total, 2);
        let contents =
            std::fs::read_to_string(temp_dir.path().join("bad_records_20240101.jsonl")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["source"], "products_csv");
        assert_eq!(entry["violations"][0], "price must be non-negative");
        assert!(entry["timestamp"].is_string());
    }

    #[test]
    fn test_log_appends_across_flushes() {
        let temp_dir = TempDir::new().unwrap();

        let mut log = BadRecordLog::new(temp_dir.path(), date("2024-01-01"));
        log.record(bad("products_csv"));
        log.flush().unwrap();
        log.record(bad("products_csv"));
        log.finalize().unwrap();

        let contents =
            std::fs::read_to_string(temp_dir.path().join("bad_records_20240101.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_empty_log_writes_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let log = BadRecordLog::new(temp_dir.path(), date("2024-01-01"));
        assert_eq!(log.finalize().unwrap(), 0);
        assert!(!temp_dir.path().join("bad_records_20240101.jsonl").exists());
    }

    #[test]
    fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("bad_records");
        let mut log = BadRecordLog::new(&nested, date("2024-01-01"));
        log.record(bad("orders_api"));
        log.finalize().unwrap();
        assert!(nested.join("bad_records_20240101.jsonl").exists());
    }
}
