//! Query result types for qbridge.
//!
//! Defines the canonical, engine-independent structures every driver decodes into.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the result of executing a SQL query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column metadata for the result set, in result order.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data. Each row has exactly `columns.len()` cells.
    pub rows: Vec<Row>,

    /// Total number of rows matching the query before pagination.
    pub count: u64,
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query result with the given columns and rows.
    ///
    /// Rows are fitted to the column count and `count` is the number of rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let width = columns.len();
        let rows: Vec<Row> = rows.into_iter().map(|row| fit_row(row, width)).collect();
        let count = rows.len() as u64;
        Self {
            columns,
            rows,
            count,
        }
    }

    /// Sets the total count.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows actually materialized (may be less than `count`).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of the first column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Truncates excess cells, pads missing ones with NULL.
pub(crate) fn fit_row(mut row: Row, width: usize) -> Row {
    row.resize(width, Value::Null);
    row
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Canonical column type name.
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// A single canonical cell value.
///
/// Serializes to the bare JSON literal for its variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed 64-bit integer.
    Int(i64),

    /// 64-bit floating point number.
    Float(f64),

    /// Text value.
    Text(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Sentinel stored in place of a cell that failed to decode.
    pub fn decode_failure(err: &DecodeError) -> Self {
        Value::Text(format!("[ERROR: {err}]"))
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl<T> From<std::result::Result<T, DecodeError>> for Value
where
    T: Into<Value>,
{
    fn from(v: std::result::Result<T, DecodeError>) -> Self {
        match v {
            Ok(val) => val.into(),
            Err(e) => Value::decode_failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Bool(true).to_display_string(), "true");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.71).to_display_string(), "2.71");
        assert_eq!(Value::Text("hello".to_string()).to_display_string(), "hello");
    }

    #[test]
    fn test_value_is_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(false).is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(2.71f64), Value::Float(2.71));
        assert_eq!(Value::from("hello"), Value::Text("hello".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(42i32)), Value::Int(42));
    }

    #[test]
    fn test_decode_failure_sentinel() {
        let v = Value::from(Err::<i64, _>(DecodeError::new("bad bytes")));
        assert_eq!(v, Value::Text("[ERROR: bad bytes]".to_string()));
    }

    #[test]
    fn test_with_data_fits_rows_to_columns() {
        let columns = vec![ColumnInfo::new("id", "int4"), ColumnInfo::new("name", "text")];
        let rows = vec![
            vec![Value::Int(1), Value::from("Alice"), Value::from("extra")],
            vec![Value::Int(2)],
        ];

        let result = QueryResult::with_data(columns, rows);

        assert_eq!(result.count, 2);
        assert_eq!(result.rows[0], vec![Value::Int(1), Value::from("Alice")]);
        assert_eq!(result.rows[1], vec![Value::Int(2), Value::Null]);
    }

    #[test]
    fn test_with_count_overrides_row_count() {
        let result = QueryResult::with_data(vec![ColumnInfo::new("x", "int4")], vec![vec![1.into()]])
            .with_count(37);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.count, 37);
    }

    #[test]
    fn test_column_info_serializes_type_field() {
        let col = ColumnInfo::new("email", "varchar");
        let json = serde_json::to_string(&col).unwrap();
        assert_eq!(json, r#"{"name":"email","type":"varchar"}"#);
    }
}
