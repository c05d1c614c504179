//! Orders pipeline: REST collection + dependent item fetches →
//! enriched orders → date-partitioned JSON Lines.
//!
//! Deduplicates across runs with a persisted seen-ID set: an order ID in
//! the set is never re-emitted. The set is saved only after every
//! partition write has succeeded, so a killed run reprocesses safely. A
//! parent whose dependent fetch exhausts its retries is skipped and
//! counted; the rest of the batch is unaffected.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::dlq::BadRecordLog;
use crate::error::PipelineError;
use crate::record::{BadRecord, CoercedRecord};
use crate::sink::write_partitioned_jsonl;
use crate::source::OrderSource;
use crate::state::SeenIdStore;
use crate::validate::{FieldKind, FieldRule, RecordRules, validate};

use super::{RunSummary, finalize_bad_records};

const PIPELINE: &str = "orders";

/// Validation rules for one order from the collection endpoint.
fn order_rules() -> RecordRules {
    RecordRules::new(vec![
        FieldRule::required("id", FieldKind::Int),
        FieldRule::required("order_date", FieldKind::Date),
        FieldRule::optional("customer_id", FieldKind::Text),
        FieldRule::optional("status", FieldKind::Text),
    ])
}

/// Validation rules for one order item from the dependent endpoint.
fn item_rules() -> RecordRules {
    RecordRules::new(vec![
        FieldRule::required("sku", FieldKind::Text),
        FieldRule::required("quantity", FieldKind::Int).at_least_one(),
        FieldRule::required("unit_price", FieldKind::Float).non_negative(),
    ])
}

/// An order assembled with its items, ready for output.
struct EnrichedOrder {
    id: String,
    order_date: NaiveDate,
    output: Value,
}

/// Build the output JSON for one enriched order.
fn enrich(order: &CoercedRecord, items: &[CoercedRecord]) -> Value {
    let mut obj = Map::new();
    for (name, value) in &order.fields {
        let key = if name == "id" { "order_id" } else { name.as_str() };
        obj.insert(key.to_string(), value.to_json());
    }
    // Unknown upstream fields pass through untouched
    for (name, value) in &order.extra {
        obj.entry(name.clone()).or_insert_with(|| value.clone());
    }

    let mut order_total = 0.0;
    let items_json: Vec<Value> = items
        .iter()
        .map(|item| {
            let quantity = item.int("quantity").unwrap_or_default();
            let unit_price = item.float("unit_price").unwrap_or_default();
            order_total += quantity as f64 * unit_price;
            let mut entry = Map::new();
            for (name, value) in &item.fields {
                entry.insert(name.clone(), value.to_json());
            }
            Value::Object(entry)
        })
        .collect();

    obj.insert("items".to_string(), Value::Array(items_json));
    obj.insert("order_total".to_string(), Value::from(order_total));
    Value::Object(obj)
}

/// Run the orders pipeline once.
pub async fn run(
    config: &Config,
    source: &dyn OrderSource,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::default();
    let run_stamp = chrono::Utc::now();

    // LOAD_STATE
    let mut seen = SeenIdStore::new(&config.paths.state_dir, PIPELINE);
    let loaded = seen.load().await;
    info!(pipeline = PIPELINE, seen_ids = loaded, "Loaded seen-ID set");

    let mut log = BadRecordLog::new(&config.paths.bad_records_dir, run_stamp.date_naive());

    // FETCH — a collection-level failure aborts the run, state untouched
    let raw_orders = source.list_orders().await?;
    summary.records_read = raw_orders.len();
    info!(pipeline = PIPELINE, orders = raw_orders.len(), "Fetched order collection");

    let order_rules = order_rules();
    let item_rules = item_rules();
    let mut enriched = Vec::new();

    for raw in raw_orders {
        // VALIDATE the parent
        let validation = validate(&order_rules, &raw);
        if !validation.is_valid() {
            summary.invalid += 1;
            log.record(BadRecord::new(
                "orders_api",
                Value::Object(raw),
                validation.violations,
            ));
            continue;
        }
        let order = validation.record;
        let id = order
            .int("id")
            .map(|n| n.to_string())
            .unwrap_or_default();
        let order_date = order.date("order_date").unwrap_or_default();

        // FETCH the dependent items; failure skips this parent only
        let raw_items = match source.fetch_items(&id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    pipeline = PIPELINE,
                    order_id = %id,
                    error = %e,
                    "Item fetch failed after retries, skipping order"
                );
                summary.skipped_parents += 1;
                log.record(BadRecord::new(
                    "order_items_fetch",
                    Value::Object(raw),
                    vec![e.to_string()],
                ));
                continue;
            }
        };

        // VALIDATE the children; a bad item invalidates the whole order
        let mut items = Vec::new();
        let mut item_violations = Vec::new();
        for raw_item in raw_items {
            let validation = validate(&item_rules, &raw_item);
            if validation.is_valid() {
                items.push(validation.record);
            } else {
                item_violations.extend(validation.violations);
            }
        }
        if !item_violations.is_empty() {
            summary.invalid += 1;
            log.record(BadRecord::new(
                "order_items_api",
                Value::Object(raw),
                item_violations,
            ));
            continue;
        }
        summary.valid += 1;

        // TRANSFORM: assemble the enriched entity before the dedup check
        let output = enrich(&order, &items);

        if seen.contains(&id) {
            summary.skipped_duplicates += 1;
            continue;
        }

        enriched.push(EnrichedOrder {
            id,
            order_date,
            output,
        });
    }

    // WRITE_SINK: one JSONL file per order-date partition
    if enriched.is_empty() {
        info!(pipeline = PIPELINE, "No new orders to write");
    } else {
        let mut by_date: BTreeMap<NaiveDate, Vec<&EnrichedOrder>> = BTreeMap::new();
        for order in &enriched {
            by_date.entry(order.order_date).or_default().push(order);
        }

        let root = config.paths.processed_output_dir.join("orders");
        let stem = format!("orders_{}", run_stamp.format("%Y%m%d-%H%M%S%3f"));
        for (date, orders) in by_date {
            let records: Vec<Value> = orders.iter().map(|o| o.output.clone()).collect();
            let path = write_partitioned_jsonl(&root, date, &stem, &records).await?;
            info!(
                pipeline = PIPELINE,
                date = %date,
                orders = records.len(),
                path = %path.display(),
                "Partition written"
            );
            summary.written += records.len();
            summary.output_paths.push(path);
        }
    }

    // WRITE_BAD_RECORDS
    finalize_bad_records(log, &mut summary);

    // UPDATE_STATE — only after every partition write succeeded
    if !enriched.is_empty() {
        for order in &enriched {
            seen.insert(&order.id);
        }
        seen.save().await?;
        info!(pipeline = PIPELINE, seen_ids = seen.len(), "Seen-ID set saved");
    }

    summary.log(PIPELINE);
    Ok(summary)
}
