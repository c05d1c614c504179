//! Declarative record validation.
//!
//! Rules are declared per field: required or optional, a target type to
//! coerce into, bounds, and enumerations, plus cross-field checks over
//! the coerced record. Validation is total: every record yields either a
//! coerced record with no violations, or a non-empty violation list —
//! all rules are checked so the bad-records log names every problem at
//! once, and an unparseable value is a violation, never a crash.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::record::{CoercedRecord, FieldValue, RawRecord};

/// Target type a field is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Float,
    Date,
    DateTime,
}

/// A declarative rule for one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    required: bool,
    bound: Option<Bound>,
    allowed: Option<&'static [&'static str]>,
}

/// A numeric lower bound with its violation message.
#[derive(Debug, Clone)]
struct Bound {
    min: f64,
    exclusive: bool,
    message: String,
}

impl Bound {
    fn violated_by(&self, value: f64) -> bool {
        if self.exclusive {
            value <= self.min
        } else {
            value < self.min
        }
    }
}

impl FieldRule {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            bound: None,
            allowed: None,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Reject values below zero.
    pub fn non_negative(mut self) -> Self {
        self.bound = Some(Bound {
            min: 0.0,
            exclusive: false,
            message: format!("{} must be non-negative", self.name),
        });
        self
    }

    /// Reject zero and below.
    pub fn positive(mut self) -> Self {
        self.bound = Some(Bound {
            min: 0.0,
            exclusive: true,
            message: format!("{} must be positive", self.name),
        });
        self
    }

    /// Reject values below one.
    pub fn at_least_one(mut self) -> Self {
        self.bound = Some(Bound {
            min: 1.0,
            exclusive: false,
            message: format!("{} must be at least 1", self.name),
        });
        self
    }

    /// Restrict to a fixed set of values.
    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

/// A check over the whole coerced record, run after field coercion.
pub struct CrossRule {
    check: Box<dyn Fn(&CoercedRecord) -> Option<String> + Send + Sync>,
}

impl CrossRule {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&CoercedRecord) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            check: Box::new(check),
        }
    }
}

/// The rule set for one record shape.
pub struct RecordRules {
    fields: Vec<FieldRule>,
    cross: Vec<CrossRule>,
}

impl RecordRules {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self {
            fields,
            cross: Vec::new(),
        }
    }

    pub fn with_cross(mut self, rule: CrossRule) -> Self {
        self.cross.push(rule);
        self
    }
}

/// Result of validating one record.
pub struct Validation {
    pub record: CoercedRecord,
    pub violations: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Validate `raw` against `rules`, collecting every violation.
pub fn validate(rules: &RecordRules, raw: &RawRecord) -> Validation {
    let mut fields = BTreeMap::new();
    let mut violations = Vec::new();

    for rule in &rules.fields {
        match raw.get(rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    violations.push(format!("missing {}", rule.name));
                }
            }
            Some(value) => match coerce(rule.kind, value) {
                Some(coerced) => {
                    if rule.required && is_blank(&coerced) {
                        violations.push(format!("missing {}", rule.name));
                        continue;
                    }
                    if let Some(bound) = &rule.bound
                        && coerced.as_float().is_some_and(|f| bound.violated_by(f))
                    {
                        violations.push(bound.message.clone());
                        continue;
                    }
                    if let Some(allowed) = rule.allowed
                        && let Some(text) = coerced.as_text()
                        && !allowed.iter().any(|a| *a == text)
                    {
                        violations.push(format!("invalid {}: '{}'", rule.name, text));
                        continue;
                    }
                    fields.insert(rule.name.to_string(), coerced);
                }
                None => {
                    violations.push(format!("invalid {}: '{}'", rule.name, raw_display(value)));
                }
            },
        }
    }

    // Unrecognized input fields pass through untouched
    let extra = raw
        .iter()
        .filter(|(key, _)| !rules.fields.iter().any(|r| r.name == key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let record = CoercedRecord { fields, extra };

    // Cross-field checks only make sense once the fields themselves parsed
    if violations.is_empty() {
        for rule in &rules.cross {
            if let Some(violation) = (rule.check)(&record) {
                violations.push(violation);
            }
        }
    }

    Validation { record, violations }
}

fn is_blank(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Text(s) if s.is_empty())
}

fn raw_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => value.as_str().map(|s| FieldValue::Text(s.trim().to_string())),
        FieldKind::Int => match value {
            Value::Number(n) => n.as_i64().map(FieldValue::Int),
            Value::String(s) => s.trim().parse::<i64>().ok().map(FieldValue::Int),
            _ => None,
        },
        FieldKind::Float => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Float),
            Value::String(s) => s.trim().parse::<f64>().ok().map(FieldValue::Float),
            _ => None,
        },
        FieldKind::Date => value
            .as_str()
            .and_then(|s| s.trim().parse::<chrono::NaiveDate>().ok())
            .map(FieldValue::Date),
        FieldKind::DateTime => value
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|t| FieldValue::DateTime(t.to_utc())),
    }
}
