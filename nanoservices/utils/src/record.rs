use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// One row, keyed by field name in source column order.
pub type Record = IndexMap<String, Value>;

/// A scalar cell value moving between the two stores.
///
/// Serialises as plain JSON (no variant tags), which is the shape
/// `json_populate_recordset` expects for update batches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric; serialises as a JSON string so no precision is lost.
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The string form of a value, as used when identifiers are bound as text.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => f.write_str(s),
            Value::Uuid(u) => write!(f, "{}", u.hyphenated()),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::TimestampTz(t) => f.write_str(&t.to_rfc3339()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v.into()) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self { Value::Decimal(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Text(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::Text(v) }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self { Value::Uuid(v) }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self { Value::Timestamp(v) }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self { Value::TimestampTz(v) }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self { Value::Date(v) }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self { Value::Json(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a record from `(field, value)` pairs, keeping their order.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
