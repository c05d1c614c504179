//! Relational sink: per-record product upserts into PostgreSQL.
//!
//! Upserts key on the product's business identifier. A single record's
//! constraint violation is caught by the caller (via
//! `SinkError::is_constraint_violation`) and logged as a bad record;
//! connection-level failures abort the run.

use async_trait::async_trait;
use chrono::Utc;
use snafu::ResultExt;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::error::{DatabaseSnafu, SinkError};
use crate::transform::ProductRow;

const PRODUCTS_TABLE: &str = "products";

/// Result of one upsert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The row was inserted or updated.
    Applied,
    /// The row violated a constraint and was rejected; the batch continues.
    Rejected(String),
}

/// Destination for merged product rows.
#[async_trait]
pub trait ProductSink {
    /// Make sure the destination table exists.
    async fn prepare(&mut self) -> Result<(), SinkError>;

    /// Insert or update one product row keyed on `product_id`.
    ///
    /// Per-record constraint violations come back as
    /// `UpsertOutcome::Rejected`; only connection-level failures are
    /// errors.
    async fn upsert(&mut self, row: &ProductRow) -> Result<UpsertOutcome, SinkError>;
}

/// DDL for the products table.
fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            product_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            price DOUBLE PRECISION NOT NULL,
            supplier_id TEXT NOT NULL,
            quantity BIGINT NOT NULL,
            updated_at TIMESTAMPTZ,
            current_value DOUBLE PRECISION NOT NULL,
            loaded_at TIMESTAMPTZ NOT NULL
        )"
    )
}

/// Parameterized upsert statement keyed on the business identifier.
fn upsert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} \
         (product_id, name, category, price, supplier_id, quantity, updated_at, current_value, loaded_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (product_id) DO UPDATE SET \
         name = EXCLUDED.name, \
         category = EXCLUDED.category, \
         price = EXCLUDED.price, \
         supplier_id = EXCLUDED.supplier_id, \
         quantity = EXCLUDED.quantity, \
         updated_at = EXCLUDED.updated_at, \
         current_value = EXCLUDED.current_value, \
         loaded_at = EXCLUDED.loaded_at"
    )
}

/// PostgreSQL-backed product sink.
pub struct PostgresSink {
    client: Client,
}

impl PostgresSink {
    /// Connect using the configured target. The connection driver runs
    /// on a background task for the life of the sink.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SinkError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host);
        pg.port(config.port);
        pg.dbname(&config.dbname);
        pg.user(&config.user);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }

        let (client, connection) = pg.connect(NoTls).await.context(DatabaseSnafu)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            "Connected to PostgreSQL"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ProductSink for PostgresSink {
    async fn prepare(&mut self) -> Result<(), SinkError> {
        self.client
            .execute(create_table_statement(PRODUCTS_TABLE).as_str(), &[])
            .await
            .context(DatabaseSnafu)?;
        Ok(())
    }

    async fn upsert(&mut self, row: &ProductRow) -> Result<UpsertOutcome, SinkError> {
        let result = self
            .client
            .execute(
                upsert_statement(PRODUCTS_TABLE).as_str(),
                &[
                    &row.product_id,
                    &row.name,
                    &row.category,
                    &row.price,
                    &row.supplier_id,
                    &row.quantity,
                    &row.updated_at,
                    &row.current_value,
                    &Utc::now(),
                ],
            )
            .await
            .context(DatabaseSnafu);

        match result {
            Ok(_) => Ok(UpsertOutcome::Applied),
            Err(e) if e.is_constraint_violation() => Ok(UpsertOutcome::Rejected(e.to_string())),
            Err(e) => Err(e),
        }
    }
}
