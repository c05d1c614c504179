//! Floe: incremental loader for dated files and REST collections.
//!
//! This crate handles:
//! - Discovering dated input files above a persisted date watermark
//! - Fetching remote collections with bounded exponential-backoff retries
//! - Validating records against declarative field rules
//! - Aggregating, merging, and enriching validated records
//! - Writing atomic CSV output, date-partitioned JSON Lines, and
//!   PostgreSQL upserts
//! - Logging bad records with their violations instead of dropping them
//! - Deduplicating across runs with a persisted seen-ID set

pub mod config;
pub mod dlq;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod sink;
pub mod source;
pub mod state;
pub mod storage;
pub mod transform;
pub mod validate;

// Re-export commonly used items
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::RunSummary;
pub use retry::RetryPolicy;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing for the CLI.
///
/// Uses the `RUST_LOG` environment variable for filtering, defaulting to
/// `info` level.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
