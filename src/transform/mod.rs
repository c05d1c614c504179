//! Derivation and aggregation over validated records.
//!
//! Output ordering is deterministic: aggregation groups live in a
//! `BTreeMap` keyed by the grouping tuple, so identical input always
//! produces identical output files.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A validated transaction row.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: String,
    pub date: NaiveDate,
    pub category: String,
    pub region: String,
    pub amount: f64,
    /// Set when `amount` exceeds the configured high-value threshold.
    pub is_high_value: bool,
}

/// Grouping key for sales aggregation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SalesKey {
    pub date: NaiveDate,
    pub category: String,
    pub region: String,
}

/// Per-group summaries.
#[derive(Debug, Clone, Default)]
pub struct SalesAggregate {
    pub total_amount: f64,
    pub count: u64,
}

impl SalesAggregate {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_amount / self.count as f64
        }
    }
}

/// Aggregate transactions by (date, category, region).
pub fn aggregate_sales(
    transactions: impl IntoIterator<Item = Transaction>,
) -> BTreeMap<SalesKey, SalesAggregate> {
    let mut groups: BTreeMap<SalesKey, SalesAggregate> = BTreeMap::new();
    for tx in transactions {
        let key = SalesKey {
            date: tx.date,
            category: tx.category,
            region: tx.region,
        };
        let entry = groups.entry(key).or_default();
        entry.total_amount += tx.amount;
        entry.count += 1;
    }
    groups
}

/// A validated product record from the products CSV.
#[derive(Debug, Clone)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub supplier_id: String,
}

/// A validated inventory record from the inventory JSON Lines file.
#[derive(Debug, Clone)]
pub struct InventoryLevel {
    pub product_id: String,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// A product joined with its inventory, ready for the relational sink.
#[derive(Debug, Clone, Serialize)]
pub struct ProductRow {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub supplier_id: String,
    pub quantity: i64,
    pub updated_at: Option<DateTime<Utc>>,
    /// Derived: price × quantity.
    pub current_value: f64,
}

/// Result of the product/inventory merge.
#[derive(Debug, Default)]
pub struct MergeResult {
    /// One row per product, in product-ID order.
    pub rows: Vec<ProductRow>,
    /// Inventory entries with no matching product.
    pub unmatched_inventory: Vec<InventoryLevel>,
}

/// Left-join products with inventory on `product_id`.
///
/// A product without inventory data is still emitted, with quantity 0
/// and `current_value` 0.0 — explicit policy, not a silent drop.
/// Inventory without a matching product is returned separately for the
/// bad-records log.
pub fn merge_products(
    products: impl IntoIterator<Item = Product>,
    inventory: impl IntoIterator<Item = InventoryLevel>,
) -> MergeResult {
    let mut by_product: BTreeMap<String, Product> = products
        .into_iter()
        .map(|p| (p.product_id.clone(), p))
        .collect();

    let mut inventory_by_product: BTreeMap<String, InventoryLevel> = BTreeMap::new();
    let mut unmatched = Vec::new();
    for level in inventory {
        if by_product.contains_key(&level.product_id) {
            inventory_by_product.insert(level.product_id.clone(), level);
        } else {
            unmatched.push(level);
        }
    }

    let mut rows = Vec::with_capacity(by_product.len());
    for (product_id, product) in std::mem::take(&mut by_product) {
        let (quantity, updated_at) = match inventory_by_product.remove(&product_id) {
            Some(level) => (level.quantity, Some(level.updated_at)),
            None => (0, None),
        };
        rows.push(ProductRow {
            current_value: product.price * quantity as f64,
            product_id: product.product_id,
            name: product.name,
            category: product.category,
            price: product.price,
            supplier_id: product.supplier_id,
            quantity,
            updated_at,
        });
    }

    MergeResult {
        rows,
        unmatched_inventory: unmatched,
    }
}
