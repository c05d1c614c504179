//! Error types for the floe loader.

use snafu::prelude::*;
use std::path::PathBuf;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Input directory is empty.
    #[snafu(display("data_input_dir cannot be empty"))]
    EmptyInputDir,

    /// Output directory is empty.
    #[snafu(display("processed_output_dir cannot be empty"))]
    EmptyOutputDir,

    /// Bad-records directory is empty.
    #[snafu(display("bad_records_dir cannot be empty"))]
    EmptyBadRecordsDir,

    /// State directory is empty.
    #[snafu(display("state_dir cannot be empty"))]
    EmptyStateDir,

    /// API base URL is empty.
    #[snafu(display("api.base_url cannot be empty"))]
    EmptyBaseUrl,

    /// Retry policy must allow at least one attempt.
    #[snafu(display("retry.max_attempts must be at least 1"))]
    ZeroAttempts,
}

/// Errors that can occur while persisting watermark or seen-ID state.
///
/// Missing or corrupt state is not an error — stores load it as default
/// state so the pipeline reprocesses rather than loses data.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StateError {
    /// Failed to read a state file.
    #[snafu(display("Failed to read state file {}", path.display()))]
    ReadState {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a state file.
    #[snafu(display("Failed to write state file {}", path.display()))]
    WriteState {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors from remote fetch operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The HTTP request itself failed (connect, timeout, protocol).
    #[snafu(display("Request to {url} failed"))]
    Request { url: String, source: reqwest::Error },

    /// The server returned a non-success status.
    #[snafu(display("{url} returned status {status}"))]
    Status { url: String, status: u16 },

    /// The response body was not the expected JSON shape.
    #[snafu(display("Failed to decode response from {url}"))]
    Decode { url: String, source: reqwest::Error },
}

impl FetchError {
    /// Whether the failure is worth retrying.
    ///
    /// Network-level failures and 408/429/5xx statuses are transient;
    /// other statuses and decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            FetchError::Decode { .. } => false,
        }
    }
}

/// Errors that can occur while reading source files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to list the input directory.
    #[snafu(display("Failed to list input directory {}", path.display()))]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open a source file.
    #[snafu(display("Failed to open source file {}", path.display()))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a CSV row.
    #[snafu(display("Failed to read CSV row in {}", path.display()))]
    CsvRead { path: PathBuf, source: csv::Error },
}

/// Errors that can occur while writing output.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// IO error writing an output file.
    #[snafu(display("Failed to write output file {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize a CSV row.
    #[snafu(display("Failed to serialize CSV output"))]
    CsvWrite { source: csv::Error },

    /// Failed to serialize a record to JSON.
    #[snafu(display("Failed to serialize output record"))]
    JsonSerialize { source: serde_json::Error },

    /// Database operation failed.
    #[snafu(display("Database operation failed"))]
    Database { source: tokio_postgres::Error },
}

impl SinkError {
    /// Whether this error is a per-record constraint violation (SQLSTATE
    /// class 23). Constraint violations are logged as bad records and do
    /// not abort the batch; anything else is fatal.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            SinkError::Database { source } => source
                .code()
                .map(|c| c.code().starts_with("23"))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Errors that can occur while appending to the bad-records log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DlqError {
    /// Failed to open the bad-records log.
    #[snafu(display("Failed to open bad-records log {}", path.display()))]
    DlqOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize a bad record.
    #[snafu(display("Failed to serialize bad record"))]
    DlqSerialize { source: serde_json::Error },

    /// Failed to append to the bad-records log.
    #[snafu(display("Failed to append to bad-records log {}", path.display()))]
    DlqAppend {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// State store error.
    #[snafu(display("State error: {source}"))]
    State { source: StateError },

    /// Remote fetch error.
    #[snafu(display("Fetch error: {source}"))]
    Fetch { source: FetchError },

    /// Source reading error.
    #[snafu(display("Source error: {source}"))]
    Source { source: SourceError },

    /// Sink writing error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Bad-records log error.
    #[snafu(display("Bad-records log error: {source}"))]
    Dlq { source: DlqError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<StateError> for PipelineError {
    fn from(source: StateError) -> Self {
        PipelineError::State { source }
    }
}

impl From<FetchError> for PipelineError {
    fn from(source: FetchError) -> Self {
        PipelineError::Fetch { source }
    }
}

impl From<SourceError> for PipelineError {
    fn from(source: SourceError) -> Self {
        PipelineError::Source { source }
    }
}

impl From<SinkError> for PipelineError {
    fn from(source: SinkError) -> Self {
        PipelineError::Sink { source }
    }
}

impl From<DlqError> for PipelineError {
    fn from(source: DlqError) -> Self {
        PipelineError::Dlq { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        for status in [408, 429, 500, 502, 503] {
            let err = FetchError::Status {
                url: "http://api/orders".into(),
                status,
            };
            assert!(err.is_transient(), "status {status} should be transient");
        }
    }

    #[test]
    fn test_non_transient_statuses() {
        for status in [400, 401, 403, 404, 422] {
            let err = FetchError::Status {
                url: "http://api/orders".into(),
                status,
            };
            assert!(!err.is_transient(), "status {status} should not retry");
        }
    }
}
