//! File sinks: dated aggregate CSV and date-partitioned JSON Lines.
//!
//! Writing is all-or-nothing for a run: output is staged to a temp file
//! and renamed into place, so a failed run leaves no partial files.

use chrono::NaiveDate;
use serde_json::Value;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CsvWriteSnafu, JsonSerializeSnafu, SinkError, WriteFileSnafu};
use crate::storage::atomic_write;
use crate::transform::{SalesAggregate, SalesKey};

/// Write aggregated sales to `{dir}/daily_sales_{YYYYMMDD}.csv`.
///
/// Rows come out in grouping-key order; amounts are fixed to two
/// decimal places.
pub async fn write_sales_csv(
    dir: &Path,
    date: NaiveDate,
    groups: &BTreeMap<SalesKey, SalesAggregate>,
) -> Result<PathBuf, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "date",
            "category",
            "region",
            "total_amount",
            "transaction_count",
            "average_amount",
        ])
        .context(CsvWriteSnafu)?;

    for (key, agg) in groups {
        writer
            .write_record([
                key.date.format("%Y-%m-%d").to_string(),
                key.category.clone(),
                key.region.clone(),
                format!("{:.2}", agg.total_amount),
                agg.count.to_string(),
                format!("{:.2}", agg.average()),
            ])
            .context(CsvWriteSnafu)?;
    }

    let contents = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .map_err(|source| SinkError::WriteFile {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(format!("daily_sales_{}.csv", date.format("%Y%m%d")));
    atomic_write(&path, &contents)
        .await
        .context(WriteFileSnafu { path: path.clone() })?;

    Ok(path)
}

/// Write records as JSON Lines under `{root}/{YYYY}/{MM}/{DD}/{stem}.jsonl`.
pub async fn write_partitioned_jsonl(
    root: &Path,
    date: NaiveDate,
    stem: &str,
    records: &[Value],
) -> Result<PathBuf, SinkError> {
    let mut contents = String::new();
    for record in records {
        let line = serde_json::to_string(record).context(JsonSerializeSnafu)?;
        contents.push_str(&line);
        contents.push('\n');
    }

    let path = root
        .join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(date.format("%d").to_string())
        .join(format!("{stem}.jsonl"));

    atomic_write(&path, contents.as_bytes())
        .await
        .context(WriteFileSnafu { path: path.clone() })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_sales_csv_contents() {
        let temp_dir = TempDir::new().unwrap();
        let mut groups = BTreeMap::new();
        groups.insert(
            SalesKey {
                date: date("2024-01-01"),
                category: "A".into(),
                region: "X".into(),
            },
            SalesAggregate {
                total_amount: 15.0,
                count: 2,
            },
        );

        let path = write_sales_csv(temp_dir.path(), date("2024-01-01"), &groups)
            .await
            .unwrap();

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("daily_sales_20240101.csv")
        );
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "date,category,region,total_amount,transaction_count,average_amount\n\
             2024-01-01,A,X,15.00,2,7.50\n"
        );
    }

    #[tokio::test]
    async fn test_partitioned_jsonl_layout() {
        let temp_dir = TempDir::new().unwrap();
        let records = vec![json!({"id": "7"}), json!({"id": "8"})];

        let path = write_partitioned_jsonl(
            temp_dir.path(),
            date("2024-03-05"),
            "orders_20240305-120000",
            &records,
        )
        .await
        .unwrap();

        assert!(path.ends_with("2024/03/05/orders_20240305-120000.jsonl"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"id\":\"7\"}\n{\"id\":\"8\"}\n");
    }
}
