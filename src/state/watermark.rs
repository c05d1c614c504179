//! Date watermark store.
//!
//! The watermark is a single `YYYY-MM-DD` line marking the last processed
//! input date. Input dated on or before the watermark is never reprocessed.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{StateError, WriteStateSnafu};
use crate::storage::atomic_write;
use snafu::ResultExt;

/// Persists the last processed date for a pipeline.
pub struct WatermarkStore {
    path: PathBuf,
    watermark: Option<NaiveDate>,
}

impl WatermarkStore {
    /// Create a store backed by `{state_dir}/{pipeline}_watermark.txt`.
    pub fn new(state_dir: &Path, pipeline: &str) -> Self {
        Self {
            path: state_dir.join(format!("{pipeline}_watermark.txt")),
            watermark: None,
        }
    }

    /// Load the watermark from disk.
    ///
    /// Returns `true` if a watermark was loaded. A missing or unparseable
    /// file is treated as no watermark (cold start), not an error.
    pub async fn load(&mut self) -> bool {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No watermark file, starting fresh");
                return false;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read watermark file, starting fresh"
                );
                return false;
            }
        };

        match contents.trim().parse::<NaiveDate>() {
            Ok(date) => {
                debug!(watermark = %date, "Loaded watermark");
                self.watermark = Some(date);
                true
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt watermark file, starting fresh"
                );
                false
            }
        }
    }

    /// The current watermark, if any.
    pub fn watermark(&self) -> Option<NaiveDate> {
        self.watermark
    }

    /// Advance the in-memory watermark if `date` is greater.
    ///
    /// Returns `true` if the watermark moved. The watermark is
    /// monotonically non-decreasing across successful runs.
    pub fn advance(&mut self, date: NaiveDate) -> bool {
        match self.watermark {
            Some(current) if date <= current => false,
            _ => {
                self.watermark = Some(date);
                true
            }
        }
    }

    /// Persist the watermark with a full atomic overwrite.
    pub async fn save(&self) -> Result<(), StateError> {
        let Some(date) = self.watermark else {
            return Ok(());
        };
        let line = format!("{}\n", date.format("%Y-%m-%d"));
        atomic_write(&self.path, line.as_bytes())
            .await
            .context(WriteStateSnafu {
                path: self.path.clone(),
            })
    }
}
