//! Transactions pipeline: dated CSV files → grouped sales aggregate.
//!
//! Incremental via a date watermark: only files dated strictly after the
//! watermark are read, and the watermark advances (after a successful
//! sink write) to the newest file date processed.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::dlq::BadRecordLog;
use crate::error::PipelineError;
use crate::record::BadRecord;
use crate::sink::write_sales_csv;
use crate::source::{discover_dated_files, read_csv_records};
use crate::state::WatermarkStore;
use crate::transform::{Transaction, aggregate_sales};
use crate::validate::{FieldKind, FieldRule, RecordRules, validate};

use super::{RunSummary, finalize_bad_records};

const PIPELINE: &str = "transactions";
const BAD_RECORD_SOURCE: &str = "transactions_csv";

/// Validation rules for one transaction row.
fn transaction_rules() -> RecordRules {
    RecordRules::new(vec![
        FieldRule::optional("transaction_id", FieldKind::Text),
        FieldRule::required("date", FieldKind::Date),
        FieldRule::required("category", FieldKind::Text),
        FieldRule::required("region", FieldKind::Text),
        FieldRule::required("amount", FieldKind::Float).positive(),
        FieldRule::optional("customer_id", FieldKind::Text),
    ])
}

/// Run the transactions pipeline once.
pub async fn run(config: &Config) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::default();

    // LOAD_STATE
    let mut watermark = WatermarkStore::new(&config.paths.state_dir, PIPELINE);
    if watermark.load().await {
        info!(
            pipeline = PIPELINE,
            watermark = %watermark.watermark().map(|d| d.to_string()).unwrap_or_default(),
            "Loaded watermark"
        );
    }

    // DISCOVER_INPUT
    let files = discover_dated_files(
        &config.paths.data_input_dir,
        "transactions",
        "csv",
        watermark.watermark(),
    )?;

    if files.is_empty() {
        info!(pipeline = PIPELINE, "No new transaction files to process");
        return Ok(summary);
    }
    info!(pipeline = PIPELINE, files = files.len(), "Found files to process");

    let latest_date = files.last().map(|f| f.date);
    let rules = transaction_rules();
    let mut log = BadRecordLog::new(&config.paths.bad_records_dir, chrono::Utc::now().date_naive());
    let mut transactions = Vec::new();

    // READ + VALIDATE
    for file in &files {
        let parsed = read_csv_records(&file.path)?;
        summary.files_read += 1;
        summary.records_read += parsed.records.len();

        for malformed in parsed.malformed {
            summary.invalid += 1;
            log.record(BadRecord::new(
                BAD_RECORD_SOURCE,
                Value::String(format!("{}:{}", file.path.display(), malformed.line)),
                vec![malformed.detail],
            ));
        }

        for raw in parsed.records {
            let validation = validate(&rules, &raw);
            if validation.is_valid() {
                let record = &validation.record;
                // Required fields are present on any valid record
                let amount = record.float("amount").unwrap_or_default();
                transactions.push(Transaction {
                    transaction_id: record.text("transaction_id").unwrap_or_default().to_string(),
                    date: record.date("date").unwrap_or_default(),
                    category: record.text("category").unwrap_or_default().to_string(),
                    region: record.text("region").unwrap_or_default().to_string(),
                    amount,
                    is_high_value: amount > config.high_value_threshold,
                });
                summary.valid += 1;
            } else {
                summary.invalid += 1;
                log.record(BadRecord::new(
                    BAD_RECORD_SOURCE,
                    Value::Object(raw),
                    validation.violations,
                ));
            }
        }
    }

    // TRANSFORM
    let groups = aggregate_sales(transactions);

    if groups.is_empty() {
        warn!(pipeline = PIPELINE, "No valid transactions to aggregate");
        finalize_bad_records(log, &mut summary);
        summary.log(PIPELINE);
        return Ok(summary);
    }

    // WRITE_SINK — state is only touched after this succeeds
    let output_date = latest_date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let path = write_sales_csv(&config.paths.processed_output_dir, output_date, &groups).await?;
    summary.written = groups.len();
    info!(
        pipeline = PIPELINE,
        groups = groups.len(),
        path = %path.display(),
        "Aggregated sales written"
    );
    summary.output_paths.push(path);

    // WRITE_BAD_RECORDS
    finalize_bad_records(log, &mut summary);

    // UPDATE_STATE
    if let Some(date) = latest_date
        && watermark.advance(date)
    {
        watermark.save().await?;
        info!(pipeline = PIPELINE, watermark = %date, "Watermark advanced");
    }

    summary.log(PIPELINE);
    Ok(summary)
}
