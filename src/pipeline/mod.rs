//! Pipeline drivers.
//!
//! Each driver runs one pipeline once, in sequence:
//! load state → discover input → fetch/read → validate → transform →
//! write sink → write bad records → update state. Any unrecoverable
//! error before the sink write aborts the run without touching state, so
//! a rerun is always safe. Bad-record log failures are logged but never
//! block the state update.

pub mod orders;
pub mod products;
pub mod transactions;

use std::path::PathBuf;
use tracing::{info, warn};

use crate::dlq::BadRecordLog;

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Input files read (file pipelines only).
    pub files_read: usize,
    /// Records read from the source.
    pub records_read: usize,
    /// Records that passed validation.
    pub valid: usize,
    /// Records that failed parsing or validation.
    pub invalid: usize,
    /// Records written to the sink.
    pub written: usize,
    /// Records skipped because their ID was already seen.
    pub skipped_duplicates: usize,
    /// Parents skipped after a dependent fetch failed all retries.
    pub skipped_parents: usize,
    /// Output files produced this run.
    pub output_paths: Vec<PathBuf>,
    /// Bad-records log location, when anything was logged.
    pub bad_records_path: Option<PathBuf>,
}

impl RunSummary {
    /// Log the end-of-run report.
    pub fn log(&self, pipeline: &str) {
        info!(
            pipeline,
            files_read = self.files_read,
            records_read = self.records_read,
            valid = self.valid,
            invalid = self.invalid,
            written = self.written,
            skipped_duplicates = self.skipped_duplicates,
            skipped_parents = self.skipped_parents,
            "Run complete"
        );
        if let Some(path) = &self.bad_records_path {
            info!(pipeline, path = %path.display(), "Bad-records log written");
        }
    }
}

/// Finalize the bad-records log, filling in the summary.
///
/// Log failures are diagnostic: they are warned about and swallowed so
/// they never block the state update that follows.
fn finalize_bad_records(log: BadRecordLog, summary: &mut RunSummary) {
    let path = log.path().to_path_buf();
    let had_records = log.total() > 0;
    match log.finalize() {
        Ok(total) => {
            if total > 0 {
                summary.bad_records_path = Some(path);
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to write bad-records log");
            if had_records {
                summary.bad_records_path = Some(path);
            }
        }
    }
}
