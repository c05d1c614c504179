//! Integration tests for the floe pipelines.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use floe::config::{ApiConfig, Config, DatabaseConfig, PathsConfig, RetryConfig};
use floe::error::{FetchError, SinkError};
use floe::record::RawRecord;
use floe::sink::{ProductSink, UpsertOutcome};
use floe::source::OrderSource;
use floe::transform::ProductRow;

fn test_config(root: &Path) -> Config {
    Config {
        database: DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            dbname: "floe_test".into(),
            user: "floe".into(),
            password: String::new(),
        },
        paths: PathsConfig {
            data_input_dir: root.join("data"),
            processed_output_dir: root.join("processed_output"),
            bad_records_dir: root.join("bad_records"),
            state_dir: root.join("state"),
        },
        api: ApiConfig {
            base_url: "http://unused.example.com".into(),
            timeout_secs: 5,
        },
        retry: RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        high_value_threshold: 1000.0,
    }
}

fn write_input(config: &Config, name: &str, contents: &str) {
    std::fs::create_dir_all(&config.paths.data_input_dir).unwrap();
    std::fs::write(config.paths.data_input_dir.join(name), contents).unwrap();
}

fn read_bad_records(config: &Config) -> Vec<serde_json::Value> {
    let dir = match std::fs::read_dir(&config.paths.bad_records_dir) {
        Ok(dir) => dir,
        Err(_) => return Vec::new(),
    };
    let mut entries = Vec::new();
    for entry in dir.filter_map(|e| e.ok()) {
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        for line in contents.lines() {
            entries.push(serde_json::from_str(line).unwrap());
        }
    }
    entries
}

mod transactions_tests {
    use super::*;

    const DAY_ONE: &str = "transaction_id,date,category,region,amount\n\
                           T001,2024-01-01,A,X,10\n\
                           T002,2024-01-01,A,X,5\n";

    #[tokio::test]
    async fn test_aggregates_one_group() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(&config, "transactions_20240101.csv", DAY_ONE);

        let summary = floe::pipeline::transactions::run(&config).await.unwrap();

        assert_eq!(summary.records_read, 2);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.written, 1);

        let output = config
            .paths
            .processed_output_dir
            .join("daily_sales_20240101.csv");
        let contents = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            contents,
            "date,category,region,total_amount,transaction_count,average_amount\n\
             2024-01-01,A,X,15.00,2,7.50\n"
        );
    }

    #[tokio::test]
    async fn test_second_run_skips_processed_dates() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(&config, "transactions_20240101.csv", DAY_ONE);

        let first = floe::pipeline::transactions::run(&config).await.unwrap();
        assert_eq!(first.files_read, 1);

        // Remove the output so a reprocess would be visible
        let output = config
            .paths
            .processed_output_dir
            .join("daily_sales_20240101.csv");
        std::fs::remove_file(&output).unwrap();

        let second = floe::pipeline::transactions::run(&config).await.unwrap();
        assert_eq!(second.files_read, 0);
        assert_eq!(second.written, 0);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_new_file_advances_watermark() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(&config, "transactions_20240101.csv", DAY_ONE);

        floe::pipeline::transactions::run(&config).await.unwrap();

        write_input(
            &config,
            "transactions_20240102.csv",
            "transaction_id,date,category,region,amount\nT003,2024-01-02,B,Y,20\n",
        );

        let summary = floe::pipeline::transactions::run(&config).await.unwrap();
        assert_eq!(summary.files_read, 1);
        assert_eq!(summary.records_read, 1);

        let watermark = std::fs::read_to_string(
            config.paths.state_dir.join("transactions_watermark.txt"),
        )
        .unwrap();
        assert_eq!(watermark.trim(), "2024-01-02");
    }

    #[tokio::test]
    async fn test_invalid_amount_goes_to_bad_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(
            &config,
            "transactions_20240101.csv",
            "transaction_id,date,category,region,amount\n\
             T001,2024-01-01,A,X,10\n\
             T002,2024-01-01,A,X,not-a-number\n",
        );

        let summary = floe::pipeline::transactions::run(&config).await.unwrap();
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 1);

        let bad = read_bad_records(&config);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0]["source"], "transactions_csv");
        assert_eq!(bad[0]["violations"][0], "invalid amount: 'not-a-number'");
    }

    #[tokio::test]
    async fn test_no_input_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        let summary = floe::pipeline::transactions::run(&config).await.unwrap();
        assert_eq!(summary.files_read, 0);
        assert_eq!(summary.written, 0);
    }
}

mod products_tests {
    use super::*;

    /// In-memory product sink standing in for PostgreSQL.
    #[derive(Default)]
    struct MemorySink {
        rows: Vec<ProductRow>,
        reject_ids: HashSet<String>,
    }

    #[async_trait]
    impl ProductSink for MemorySink {
        async fn prepare(&mut self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn upsert(&mut self, row: &ProductRow) -> Result<UpsertOutcome, SinkError> {
            if self.reject_ids.contains(&row.product_id) {
                return Ok(UpsertOutcome::Rejected("unique violation".to_string()));
            }
            self.rows.retain(|r| r.product_id != row.product_id);
            self.rows.push(row.clone());
            Ok(UpsertOutcome::Applied)
        }
    }

    const PRODUCTS: &str = "product_id,name,category,price,supplier_id\n\
                            P001,Laptop,Electronics,1200.00,S001\n\
                            P002,Novel,Books,15.50,S003\n\
                            P003,Broken,Electronics,-5.00,S001\n";

    const INVENTORY: &str = concat!(
        "{\"product_id\": \"P001\", \"quantity\": 3, \"updated_at\": \"2024-01-01T10:00:00Z\"}\n",
        "{\"product_id\": \"P999\", \"quantity\": 9, \"updated_at\": \"2024-01-01T10:00:00Z\"}\n",
    );

    #[tokio::test]
    async fn test_merge_and_upsert() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(&config, "products_20240101.csv", PRODUCTS);
        write_input(&config, "inventory_20240101.json", INVENTORY);

        let mut sink = MemorySink::default();
        let summary = floe::pipeline::products::run(
            &config,
            &mut sink,
            "2024-01-01".parse().unwrap(),
        )
        .await
        .unwrap();

        // P003 fails validation; P001 and P002 load
        assert_eq!(summary.written, 2);
        assert_eq!(sink.rows.len(), 2);

        let p1 = sink.rows.iter().find(|r| r.product_id == "P001").unwrap();
        assert_eq!(p1.quantity, 3);
        assert_eq!(p1.current_value, 3600.0);

        // Left join: P002 has no inventory but is still emitted
        let p2 = sink.rows.iter().find(|r| r.product_id == "P002").unwrap();
        assert_eq!(p2.quantity, 0);
        assert_eq!(p2.current_value, 0.0);
        assert!(p2.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_negative_price_routed_to_bad_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(&config, "products_20240101.csv", PRODUCTS);
        write_input(&config, "inventory_20240101.json", INVENTORY);

        let mut sink = MemorySink::default();
        floe::pipeline::products::run(&config, &mut sink, "2024-01-01".parse().unwrap())
            .await
            .unwrap();

        // The bad product is absent from the sink
        assert!(sink.rows.iter().all(|r| r.product_id != "P003"));

        let bad = read_bad_records(&config);
        let product_entry = bad
            .iter()
            .find(|e| e["source"] == "products_csv")
            .expect("bad product logged");
        assert_eq!(product_entry["violations"][0], "price must be non-negative");

        // Unmatched inventory is logged too
        assert!(bad.iter().any(|e| e["source"] == "unmatched_inventory"));
    }

    #[tokio::test]
    async fn test_rejected_row_does_not_abort_batch() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        write_input(&config, "products_20240101.csv", PRODUCTS);
        write_input(&config, "inventory_20240101.json", INVENTORY);

        let mut sink = MemorySink::default();
        sink.reject_ids.insert("P001".to_string());

        let summary = floe::pipeline::products::run(
            &config,
            &mut sink,
            "2024-01-01".parse().unwrap(),
        )
        .await
        .unwrap();

        // P001 is rejected but P002 still loads
        assert_eq!(summary.written, 1);
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(sink.rows[0].product_id, "P002");

        let bad = read_bad_records(&config);
        let entry = bad.iter().find(|e| e["source"] == "db_load_failure").unwrap();
        assert_eq!(entry["violations"][0], "unique violation");
    }

    #[tokio::test]
    async fn test_missing_input_files_is_empty_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        let mut sink = MemorySink::default();
        let summary = floe::pipeline::products::run(
            &config,
            &mut sink,
            "2024-01-01".parse().unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(summary.records_read, 0);
        assert_eq!(summary.written, 0);
        assert!(sink.rows.is_empty());
    }
}

mod orders_tests {
    use super::*;

    /// Fixture order source with injectable per-order item failures.
    struct FixtureSource {
        orders: Vec<RawRecord>,
        items: HashMap<String, Vec<RawRecord>>,
        fail_items_for: HashSet<String>,
    }

    impl FixtureSource {
        fn new() -> Self {
            let orders = vec![
                json!({"id": 7, "order_date": "2024-03-05", "customer_id": "C1", "status": "shipped"}),
                json!({"id": 8, "order_date": "2024-03-05", "customer_id": "C2", "status": "shipped"}),
                json!({"id": 9, "order_date": "2024-03-06", "customer_id": "C3", "status": "pending"}),
            ]
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();

            let mut items = HashMap::new();
            for id in ["7", "8", "9"] {
                items.insert(
                    id.to_string(),
                    vec![
                        json!({"sku": format!("SKU-{id}-1"), "quantity": 2, "unit_price": 10.0})
                            .as_object()
                            .unwrap()
                            .clone(),
                    ],
                );
            }

            Self {
                orders,
                items,
                fail_items_for: HashSet::new(),
            }
        }
    }

    #[async_trait]
    impl OrderSource for FixtureSource {
        async fn list_orders(&self) -> Result<Vec<RawRecord>, FetchError> {
            Ok(self.orders.clone())
        }

        async fn fetch_items(&self, order_id: &str) -> Result<Vec<RawRecord>, FetchError> {
            if self.fail_items_for.contains(order_id) {
                return Err(FetchError::Status {
                    url: format!("http://fixture/orders/{order_id}/items"),
                    status: 503,
                });
            }
            Ok(self.items.get(order_id).cloned().unwrap_or_default())
        }
    }

    fn output_files(config: &Config) -> Vec<std::path::PathBuf> {
        let root = config.paths.processed_output_dir.join("orders");
        let mut files = Vec::new();
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_enriched_orders_partitioned_by_date() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let source = FixtureSource::new();

        let summary = floe::pipeline::orders::run(&config, &source).await.unwrap();

        assert_eq!(summary.records_read, 3);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.written, 3);

        let files = output_files(&config);
        assert_eq!(files.len(), 2);
        assert!(files[0].to_string_lossy().contains("2024/03/05"));
        assert!(files[1].to_string_lossy().contains("2024/03/06"));

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["order_id"], 7);
        assert_eq!(first["order_total"], 20.0);
        assert_eq!(first["items"][0]["sku"], "SKU-7-1");
    }

    #[tokio::test]
    async fn test_second_run_writes_nothing_new() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let source = FixtureSource::new();

        let first = floe::pipeline::orders::run(&config, &source).await.unwrap();
        assert_eq!(first.written, 3);
        let files_after_first = output_files(&config);

        let seen_path = config.paths.state_dir.join("orders_seen_ids.txt");
        let seen_after_first = std::fs::read_to_string(&seen_path).unwrap();

        let second = floe::pipeline::orders::run(&config, &source).await.unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.skipped_duplicates, 3);

        // No new output files, seen-ID set unchanged
        assert_eq!(output_files(&config), files_after_first);
        assert_eq!(std::fs::read_to_string(&seen_path).unwrap(), seen_after_first);
    }

    #[tokio::test]
    async fn test_failed_parent_is_skipped_and_retried_next_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut source = FixtureSource::new();
        source.fail_items_for.insert("7".to_string());

        let summary = floe::pipeline::orders::run(&config, &source).await.unwrap();

        // Parent 7 is absent; the others are written
        assert_eq!(summary.skipped_parents, 1);
        assert_eq!(summary.written, 2);

        let all_output: String = output_files(&config)
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert!(!all_output.contains("\"order_id\":7"));
        assert!(all_output.contains("\"order_id\":8"));

        let bad = read_bad_records(&config);
        assert!(bad.iter().any(|e| e["source"] == "order_items_fetch"));

        // The skipped parent was not marked seen, so the next run picks it up
        let seen = std::fs::read_to_string(config.paths.state_dir.join("orders_seen_ids.txt"))
            .unwrap();
        assert!(!seen.lines().any(|l| l == "7"));

        source.fail_items_for.clear();
        let retry_run = floe::pipeline::orders::run(&config, &source).await.unwrap();
        assert_eq!(retry_run.written, 1);
        assert_eq!(retry_run.skipped_duplicates, 2);
    }

    #[tokio::test]
    async fn test_invalid_order_goes_to_bad_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut source = FixtureSource::new();
        source.orders.push(
            json!({"id": "not-a-number", "order_date": "bad-date"})
                .as_object()
                .unwrap()
                .clone(),
        );

        let summary = floe::pipeline::orders::run(&config, &source).await.unwrap();
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.written, 3);

        let bad = read_bad_records(&config);
        let entry = bad.iter().find(|e| e["source"] == "orders_api").unwrap();
        assert_eq!(entry["violations"].as_array().unwrap().len(), 2);
    }
}
