//! Products pipeline: dated products CSV + inventory JSON Lines →
//! left-join merge → PostgreSQL upsert.
//!
//! One dated input pair is processed per run. A single record's
//! constraint violation is logged as a bad record and the batch
//! continues; a connection-level failure aborts the run.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::dlq::BadRecordLog;
use crate::error::PipelineError;
use crate::record::BadRecord;
use crate::sink::{ProductSink, UpsertOutcome};
use crate::source::{FileRecords, dated_path, read_csv_records, read_jsonl_records};
use crate::transform::{InventoryLevel, Product, merge_products};
use crate::validate::{FieldKind, FieldRule, RecordRules, validate};

use super::{RunSummary, finalize_bad_records};

const PIPELINE: &str = "products";

/// Validation rules for one product CSV row.
fn product_rules() -> RecordRules {
    RecordRules::new(vec![
        FieldRule::required("product_id", FieldKind::Text),
        FieldRule::required("name", FieldKind::Text),
        FieldRule::required("category", FieldKind::Text)
            .one_of(&["Electronics", "Books", "Apparel", "Home Goods"]),
        FieldRule::required("price", FieldKind::Float).non_negative(),
        FieldRule::optional("supplier_id", FieldKind::Text),
    ])
}

/// Validation rules for one inventory JSON line.
fn inventory_rules() -> RecordRules {
    RecordRules::new(vec![
        FieldRule::required("product_id", FieldKind::Text),
        FieldRule::required("quantity", FieldKind::Int).non_negative(),
        FieldRule::required("updated_at", FieldKind::DateTime),
    ])
}

/// Read one dated input file, routing malformed lines to the log.
///
/// A missing input file is an empty sequence, not an error.
fn read_input(
    path: &std::path::Path,
    source: &str,
    read: impl Fn(&std::path::Path) -> Result<FileRecords, crate::error::SourceError>,
    log: &mut BadRecordLog,
    summary: &mut RunSummary,
) -> Result<Vec<crate::record::RawRecord>, PipelineError> {
    if !path.exists() {
        warn!(pipeline = PIPELINE, path = %path.display(), "Input file not found, skipping");
        return Ok(Vec::new());
    }

    let parsed = read(path)?;
    summary.files_read += 1;
    summary.records_read += parsed.records.len();

    for malformed in parsed.malformed {
        summary.invalid += 1;
        log.record(BadRecord::new(
            source,
            Value::String(format!("{}:{}", path.display(), malformed.line)),
            vec![malformed.detail],
        ));
    }

    Ok(parsed.records)
}

/// Run the products pipeline for one input date.
pub async fn run(
    config: &Config,
    sink: &mut dyn ProductSink,
    date: NaiveDate,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::default();
    let mut log = BadRecordLog::new(&config.paths.bad_records_dir, date);

    // DISCOVER_INPUT + READ
    let products_path = dated_path(&config.paths.data_input_dir, "products", date, "csv");
    let inventory_path = dated_path(&config.paths.data_input_dir, "inventory", date, "json");
    info!(
        pipeline = PIPELINE,
        products = %products_path.display(),
        inventory = %inventory_path.display(),
        "Extracting input"
    );

    let raw_products = read_input(
        &products_path,
        "products_csv",
        read_csv_records,
        &mut log,
        &mut summary,
    )?;
    let raw_inventory = read_input(
        &inventory_path,
        "inventory_json",
        read_jsonl_records,
        &mut log,
        &mut summary,
    )?;

    // VALIDATE
    let rules = product_rules();
    let mut products = Vec::new();
    for raw in raw_products {
        let validation = validate(&rules, &raw);
        if validation.is_valid() {
            let record = &validation.record;
            products.push(Product {
                product_id: record.text("product_id").unwrap_or_default().to_string(),
                name: record.text("name").unwrap_or_default().to_string(),
                category: record.text("category").unwrap_or_default().to_string(),
                price: record.float("price").unwrap_or_default(),
                supplier_id: record.text("supplier_id").unwrap_or_default().to_string(),
            });
            summary.valid += 1;
        } else {
            summary.invalid += 1;
            log.record(BadRecord::new(
                "products_csv",
                Value::Object(raw),
                validation.violations,
            ));
        }
    }

    let rules = inventory_rules();
    let mut inventory = Vec::new();
    for raw in raw_inventory {
        let validation = validate(&rules, &raw);
        if validation.is_valid() {
            let record = &validation.record;
            inventory.push(InventoryLevel {
                product_id: record.text("product_id").unwrap_or_default().to_string(),
                quantity: record.int("quantity").unwrap_or_default(),
                updated_at: record.datetime("updated_at").unwrap_or_default(),
            });
            summary.valid += 1;
        } else {
            summary.invalid += 1;
            log.record(BadRecord::new(
                "inventory_json",
                Value::Object(raw),
                validation.violations,
            ));
        }
    }

    // TRANSFORM
    let merged = merge_products(products, inventory);
    for level in &merged.unmatched_inventory {
        log.record(BadRecord::new(
            "unmatched_inventory",
            serde_json::json!({
                "product_id": level.product_id,
                "quantity": level.quantity,
                "updated_at": level.updated_at.to_rfc3339(),
            }),
            vec!["no matching product details found".to_string()],
        ));
    }

    // WRITE_SINK
    if merged.rows.is_empty() {
        info!(pipeline = PIPELINE, "No valid products to load");
    } else {
        sink.prepare().await?;
        info!(
            pipeline = PIPELINE,
            rows = merged.rows.len(),
            "Loading products into database"
        );
        for row in &merged.rows {
            match sink.upsert(row).await? {
                UpsertOutcome::Applied => summary.written += 1,
                UpsertOutcome::Rejected(reason) => {
                    // One bad row does not abort the batch
                    warn!(
                        pipeline = PIPELINE,
                        product_id = %row.product_id,
                        reason = %reason,
                        "Upsert rejected, logging bad record"
                    );
                    log.record(BadRecord::new(
                        "db_load_failure",
                        serde_json::to_value(row).unwrap_or(Value::Null),
                        vec![reason],
                    ));
                }
            }
        }
    }

    // WRITE_BAD_RECORDS
    finalize_bad_records(log, &mut summary);

    summary.log(PIPELINE);
    Ok(summary)
}
