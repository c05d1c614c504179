//! Local filesystem helpers shared by state stores and file sinks.
//!
//! # Atomic Writes
//!
//! Output and state updates use the atomic write pattern:
//! 1. Write to a temp file: `{name}.tmp`
//! 2. Rename to the final path
//!
//! A reader never observes a partially written file, and a failed run
//! leaves the previous contents intact.

use std::io;
use std::path::{Path, PathBuf};

/// Write `contents` to `path` atomically via a temp file and rename.
///
/// Creates parent directories as needed.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
