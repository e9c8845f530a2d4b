//! JSON wire form of query results.
//!
//! ```text
//! {"rows":[{"<col>":<value>,...},...],"columns":[{"name":"<n>","type":"<t>"},...],"count":<n>}
//! ```
//!
//! Strings are escaped by `serde_json`: quote, backslash and the short control
//! escapes (`\n`, `\t`, ...) use two-character sequences, other bytes below
//! 0x20 use `\u00XX`, everything else passes through. Floats use the shortest
//! round-trip representation. Non-finite floats have no JSON literal and are
//! written as `null`.

use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::Serialize;

use crate::db::{ColumnInfo, QueryResult, Value};
use crate::error::{BridgeError, Result};

/// Estimated bytes per cell when sizing the output buffer.
const BYTES_PER_CELL: usize = 40;

const BUFFER_MARGIN: usize = 128;

/// Encodes a result into its JSON wire form in one pass.
pub fn encode(result: &QueryResult) -> Result<String> {
    let mut buf = Vec::with_capacity(estimated_size(result));
    serde_json::to_writer(&mut buf, result)
        .map_err(|e| BridgeError::internal(format!("JSON encoding failed: {e}")))?;
    String::from_utf8(buf)
        .map_err(|e| BridgeError::internal(format!("JSON encoding produced invalid UTF-8: {e}")))
}

fn estimated_size(result: &QueryResult) -> usize {
    result
        .rows
        .len()
        .saturating_mul(result.columns.len())
        .saturating_mul(BYTES_PER_CELL)
        .saturating_add(BUFFER_MARGIN)
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QueryResult", 3)?;
        state.serialize_field("rows", &WireRows(self))?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("count", &self.count)?;
        state.end()
    }
}

struct WireRows<'a>(&'a QueryResult);

impl Serialize for WireRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let columns = &self.0.columns;
        serializer.collect_seq(self.0.rows.iter().map(|row| WireRow { columns, row }))
    }
}

/// One row as an object keyed by column name.
struct WireRow<'a> {
    columns: &'a [ColumnInfo],
    row: &'a [Value],
}

impl Serialize for WireRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.row.len().min(self.columns.len());
        let mut map = serializer.serialize_map(Some(len))?;
        for (column, value) in self.columns.iter().zip(self.row) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}
