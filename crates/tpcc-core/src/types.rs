//! Core value and result types

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// A database value as bound to a statement or decoded from the wire,
/// before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Exact decimal (NUMERIC / DECIMAL columns)
    Decimal(Decimal),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Timestamp without timezone
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Normalize into a result cell. See [`Scalar`].
    pub fn normalize(self) -> Scalar {
        Scalar::from(self)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", iso_date(v)),
            Value::Time(v) => write!(f, "{}", iso_time(v)),
            Value::DateTime(v) => write!(f, "{}", iso_datetime(v)),
            Value::DateTimeUtc(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTimeUtc(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

fn iso_date(v: &NaiveDate) -> String {
    v.format("%Y-%m-%d").to_string()
}

fn iso_time(v: &NaiveTime) -> String {
    v.format("%H:%M:%S%.f").to_string()
}

fn iso_datetime(v: &NaiveDateTime) -> String {
    v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Decode bytes as UTF-8, dropping any invalid sequences.
pub fn decode_utf8_lossy_dropping(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// A normalized result cell.
///
/// Temporal values are rendered as ISO-8601 strings and binary payloads are
/// decoded as UTF-8 text, so callers never need to inspect backend types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    /// ISO-8601 rendering of a date, time or timestamp
    Timestamp(String),
    /// UTF-8 decoding of a binary payload
    Binary(String),
    Json(serde_json::Value),
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(v) => Scalar::Bool(v),
            Value::Int16(v) => Scalar::Int(v as i64),
            Value::Int32(v) => Scalar::Int(v as i64),
            Value::Int64(v) => Scalar::Int(v),
            Value::Float32(v) => Scalar::Float(v as f64),
            Value::Float64(v) => Scalar::Float(v),
            Value::Decimal(v) => Scalar::Decimal(v),
            Value::String(v) => Scalar::Text(v),
            Value::Uuid(v) => Scalar::Text(v.to_string()),
            Value::Bytes(v) => Scalar::Binary(decode_utf8_lossy_dropping(&v)),
            Value::Date(v) => Scalar::Timestamp(iso_date(&v)),
            Value::Time(v) => Scalar::Timestamp(iso_time(&v)),
            Value::DateTime(v) => Scalar::Timestamp(iso_datetime(&v)),
            Value::DateTimeUtc(v) => Scalar::Timestamp(v.to_rfc3339()),
            Value::Json(v) => Scalar::Json(v),
        }
    }
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Scalar::Text(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Decimal(d) => d.to_f64(),
            Scalar::Text(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get as an exact decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Scalar::Decimal(d) => Some(*d),
            Scalar::Int(v) => Some(Decimal::from(*v)),
            Scalar::Float(v) => Decimal::from_f64(*v),
            Scalar::Text(s) => s.parse::<Decimal>().ok(),
            _ => None,
        }
    }

    /// Try to get as a string slice (text, timestamps and decoded binary)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) | Scalar::Timestamp(s) | Scalar::Binary(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Decimal(v) => write!(f, "{}", v),
            Scalar::Text(v) | Scalar::Timestamp(v) | Scalar::Binary(v) => write!(f, "{}", v),
            Scalar::Json(v) => write!(f, "{}", v),
        }
    }
}

/// A result row: column name to normalized cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: HashMap<String, Scalar>,
}

impl Row {
    /// Create a row from parallel column names and raw values, normalizing each cell.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            values: columns
                .into_iter()
                .zip(values)
                .map(|(column, value)| (column, Scalar::from(value)))
                .collect(),
        }
    }

    /// Create a row from already normalized cells.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Scalar)>,
        K: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Get a cell by column name
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.values.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Scalar::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Scalar::as_f64)
    }

    pub fn get_decimal(&self, column: &str) -> Option<Decimal> {
        self.get(column).and_then(Scalar::as_decimal)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Scalar::as_str)
    }

    /// Column names, in no particular order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, Scalar> {
        self.values
    }
}

/// Result of executing one statement
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Result rows; empty for statements that do not produce rows
    pub rows: Vec<Row>,
    /// Rows affected (for DML without RETURNING)
    pub affected_rows: u64,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl ResultSet {
    /// Create a new empty result set
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn into_first(self) -> Option<Row> {
        self.rows.into_iter().next()
    }
}
