//! Sink writers: dated aggregate CSV, partitioned JSON Lines, PostgreSQL.

mod files;
mod postgres;

pub use files::{write_partitioned_jsonl, write_sales_csv};
pub use postgres::{PostgresSink, ProductSink, UpsertOutcome};
