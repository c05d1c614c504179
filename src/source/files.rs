//! Dated input file discovery and parsing.
//!
//! Input files are named `{entity}_{YYYYMMDD}.{ext}`. Discovery lists the
//! input directory, parses the date out of each matching filename, and
//! filters to dates strictly above the watermark. No matching files is an
//! empty sequence, not an error. Files whose names match the prefix but
//! carry an unparseable date are warned about and skipped.

use chrono::NaiveDate;
use serde_json::Value;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{CsvReadSnafu, ListDirSnafu, OpenFileSnafu, SourceError};
use crate::record::RawRecord;

/// An input file with the date parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedFile {
    pub path: PathBuf,
    pub date: NaiveDate,
}

/// A line that could not be parsed into a record.
#[derive(Debug, Clone)]
pub struct Malformed {
    /// 1-based line number within the file.
    pub line: u64,
    /// What went wrong.
    pub detail: String,
}

/// Records parsed from one file, with any malformed lines kept aside
/// for the bad-records log.
#[derive(Debug, Default)]
pub struct FileRecords {
    pub records: Vec<RawRecord>,
    pub malformed: Vec<Malformed>,
}

/// List `{prefix}_{YYYYMMDD}.{extension}` files in `dir` dated strictly
/// after `newer_than`, sorted by date.
///
/// A missing input directory is an empty sequence.
pub fn discover_dated_files(
    dir: &Path,
    prefix: &str,
    extension: &str,
    newer_than: Option<NaiveDate>,
) -> Result<Vec<DatedFile>, SourceError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "Input directory does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(source).context(ListDirSnafu {
                path: dir.to_path_buf(),
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.context(ListDirSnafu {
            path: dir.to_path_buf(),
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some(date) = parse_dated_filename(name, prefix, extension) else {
            if name.starts_with(prefix) && name.ends_with(extension) {
                warn!(file = name, "Could not parse date from filename, skipping");
            }
            continue;
        };

        if newer_than.is_none_or(|wm| date > wm) {
            files.push(DatedFile { path, date });
        }
    }

    files.sort_by_key(|f| f.date);
    Ok(files)
}

/// Parse the date out of `{prefix}_{YYYYMMDD}.{extension}`.
pub fn parse_dated_filename(name: &str, prefix: &str, extension: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    let date_str = rest.strip_suffix(extension)?.strip_suffix('.')?;
    NaiveDate::parse_from_str(date_str, "%Y%m%d").ok()
}

/// Path of the dated file `{prefix}_{YYYYMMDD}.{extension}` under `dir`.
pub fn dated_path(dir: &Path, prefix: &str, date: NaiveDate, extension: &str) -> PathBuf {
    dir.join(format!("{prefix}_{}.{extension}", date.format("%Y%m%d")))
}

/// Read a CSV file with a header row into raw records.
///
/// Every cell becomes a JSON string value keyed by its header. Rows the
/// CSV parser rejects are collected as malformed, not fatal.
pub fn read_csv_records(path: &Path) -> Result<FileRecords, SourceError> {
    let file = std::fs::File::open(path).context(OpenFileSnafu {
        path: path.to_path_buf(),
    })?;
    // Flexible so short rows become malformed records instead of reader errors
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = reader
        .headers()
        .context(CsvReadSnafu {
            path: path.to_path_buf(),
        })?
        .clone();

    let mut out = FileRecords::default();
    for result in reader.into_records() {
        match result {
            Ok(row) => {
                let line = row.position().map(|p| p.line()).unwrap_or(0);
                if row.len() != headers.len() {
                    out.malformed.push(Malformed {
                        line,
                        detail: format!(
                            "expected {} fields, found {}",
                            headers.len(),
                            row.len()
                        ),
                    });
                    continue;
                }
                let record: RawRecord = headers
                    .iter()
                    .zip(row.iter())
                    .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                    .collect();
                out.records.push(record);
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                out.malformed.push(Malformed {
                    line,
                    detail: e.to_string(),
                });
            }
        }
    }

    Ok(out)
}

/// Read a JSON Lines file into raw records.
///
/// Lines that are not JSON objects are collected as malformed, not fatal.
pub fn read_jsonl_records(path: &Path) -> Result<FileRecords, SourceError> {
    let contents = std::fs::read_to_string(path).context(OpenFileSnafu {
        path: path.to_path_buf(),
    })?;

    let mut out = FileRecords::default();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => out.records.push(record),
            Ok(other) => out.malformed.push(Malformed {
                line: index as u64 + 1,
                detail: format!("expected a JSON object, found {other}"),
            }),
            Err(e) => out.malformed.push(Malformed {
                line: index as u64 + 1,
                detail: format!("JSON decode error: {e}"),
            }),
        }
    }

    Ok(out)
}
