//! Record types shared across the pipelines.
//!
//! A `RawRecord` is the untyped map a source reader hands to the
//! validator. Validation produces a coerced map of typed `FieldValue`s
//! plus an extra-fields side-channel for unknown keys, or a `BadRecord`
//! carrying every violated rule.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An untyped record as read from a file row or an API response entry.
pub type RawRecord = Map<String, Value>;

/// A typed field value produced by coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    /// Convert back into a JSON value for output serialization.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Int(n) => Value::from(*n),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(t) => Value::String(t.to_rfc3339()),
        }
    }
}

/// A record that passed validation: typed fields plus unrecognized
/// input fields preserved for forward compatibility.
#[derive(Debug, Clone)]
pub struct CoercedRecord {
    /// Coerced fields, keyed by rule name. Sorted for deterministic output.
    pub fields: BTreeMap<String, FieldValue>,
    /// Input fields no rule matched, passed through untouched.
    pub extra: Map<String, Value>,
}

impl CoercedRecord {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_float)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.fields.get(name).and_then(FieldValue::as_date)
    }

    pub fn datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        self.fields.get(name).and_then(FieldValue::as_datetime)
    }
}

/// A record that failed validation, logged with its violations.
#[derive(Debug, Clone, Serialize)]
pub struct BadRecord {
    /// Which input the record came from (e.g. "transactions_csv").
    pub source: String,
    /// The raw record as read.
    pub record: Value,
    /// Every violated rule, in rule order.
    pub violations: Vec<String>,
    /// When the record was rejected.
    pub timestamp: DateTime<Utc>,
}

impl BadRecord {
    pub fn new(source: &str, record: Value, violations: Vec<String>) -> Self {
        Self {
            source: source.to_string(),
            record,
            violations,
            timestamp: Utc::now(),
        }
    }
}
