//! Configuration for the floe loader.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Connection target for the relational sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name.
    pub dbname: String,
    /// Database user.
    pub user: String,
    /// Database password.
    #[serde(default)]
    pub password: String,
}

fn default_db_port() -> u16 {
    5432
}

/// File locations used by the pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory containing dated input files.
    pub data_input_dir: PathBuf,
    /// Directory for aggregated and partitioned output.
    pub processed_output_dir: PathBuf,
    /// Directory for bad-records logs.
    pub bad_records_dir: PathBuf,
    /// Directory for watermark and seen-ID state files.
    pub state_dir: PathBuf,
}

/// Remote API settings for the orders pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

/// Retry policy settings for remote calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Main configuration for floe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relational sink connection target.
    pub database: DatabaseConfig,
    /// File locations.
    pub paths: PathsConfig,
    /// Remote API settings.
    pub api: ApiConfig,
    /// Retry policy for remote calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Amount above which a transaction is flagged as high-value.
    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold: f64,
}

fn default_high_value_threshold() -> f64 {
    1000.0
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        // Interpolate environment variables before parsing
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config: Config = serde_yaml::from_str(&result.text)
            .map_err(|source| ConfigError::YamlParse { source })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.data_input_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInputDir);
        }
        if self.paths.processed_output_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }
        if self.paths.bad_records_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBadRecordsDir);
        }
        if self.paths.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStateDir);
        }
        if self.api.base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}
