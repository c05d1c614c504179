//! Seen-ID set store.
//!
//! Persists the identifiers already successfully ingested, one per line.
//! An identifier in the set is never re-emitted to the sink in a later run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{StateError, WriteStateSnafu};
use crate::storage::atomic_write;
use snafu::ResultExt;

/// Persists the set of already-ingested identifiers for a pipeline.
pub struct SeenIdStore {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl SeenIdStore {
    /// Create a store backed by `{state_dir}/{pipeline}_seen_ids.txt`.
    pub fn new(state_dir: &Path, pipeline: &str) -> Self {
        Self {
            path: state_dir.join(format!("{pipeline}_seen_ids.txt")),
            ids: BTreeSet::new(),
        }
    }

    /// Load the set from disk.
    ///
    /// Returns the number of identifiers loaded. A missing or unreadable
    /// file is an empty set (cold start), not an error.
    pub async fn load(&mut self) -> usize {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No seen-ID file, starting fresh");
                return 0;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read seen-ID file, starting fresh"
                );
                return 0;
            }
        };

        self.ids = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        debug!(count = self.ids.len(), "Loaded seen-ID set");
        self.ids.len()
    }

    /// Whether `id` has already been ingested.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` as ingested. Returns `true` if it was new.
    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Persist the set with a full atomic overwrite, one ID per line.
    pub async fn save(&self) -> Result<(), StateError> {
        let mut contents = String::new();
        for id in &self.ids {
            contents.push_str(id);
            contents.push('\n');
        }
        atomic_write(&self.path, contents.as_bytes())
            .await
            .context(WriteStateSnafu {
                path: self.path.clone(),
            })
    }
}
