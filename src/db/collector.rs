//! Result collection.
//!
//! Drives cell decoding across one or more native result batches and
//! assembles the canonical [`QueryResult`].

use super::rewrite::TOTAL_COUNT_COLUMN;
use super::types::{fit_row, ColumnInfo, QueryResult, Row, Value};

/// A chunk of rows as delivered by an engine driver.
///
/// Implementations decode cells through their engine's closed set of native
/// column kinds. `decode` never fails: a cell that cannot be decoded comes back
/// as the sentinel from [`Value::decode_failure`].
pub trait NativeBatch {
    /// Number of columns in this batch.
    fn column_count(&self) -> usize;

    /// Number of rows in this batch.
    fn row_count(&self) -> usize;

    /// Name of column `col`.
    fn column_name(&self, col: usize) -> &str;

    /// Canonical type name of column `col`.
    fn column_type(&self, col: usize) -> String;

    /// Decodes the cell at (`row`, `col`).
    fn decode(&self, row: usize, col: usize) -> Value;
}

/// Accumulates decoded rows from native batches.
#[derive(Debug, Default)]
pub struct ResultCollector {
    /// Captured from the first batch with columns, immutable afterwards.
    columns: Option<Vec<ColumnInfo>>,
    /// Position of the injected count column in native batches.
    marker: Option<usize>,
    strip_marker: bool,
    marker_count: Option<u64>,
    rows: Vec<Row>,
}

impl ResultCollector {
    /// Creates a collector that exposes every column as-is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector that lifts the injected total-count column out of
    /// the result and into `count`.
    pub fn with_count_marker() -> Self {
        Self {
            strip_marker: true,
            ..Self::default()
        }
    }

    /// Decodes every cell of `batch` and appends its rows.
    ///
    /// Columns come from the first batch that carries any, even when it holds
    /// no rows, so an empty result still describes its shape.
    pub fn push_batch<B: NativeBatch + ?Sized>(&mut self, batch: &B) {
        if self.columns.is_none() && batch.column_count() > 0 {
            self.capture_columns(batch);
        }

        let row_count = batch.row_count();
        if row_count == 0 {
            return;
        }
        let width = self.columns.as_ref().map_or(0, Vec::len);

        if self.rows.is_empty() && self.marker_count.is_none() {
            if let Some(marker) = self.marker {
                self.marker_count = count_from_value(&batch.decode(0, marker));
            }
        }

        self.rows.reserve(row_count);
        for row_idx in 0..row_count {
            let row: Row = (0..batch.column_count())
                .filter(|&col| Some(col) != self.marker)
                .map(|col| batch.decode(row_idx, col))
                .collect();
            self.rows.push(fit_row(row, width));
        }
    }

    fn capture_columns<B: NativeBatch + ?Sized>(&mut self, batch: &B) {
        let mut columns = Vec::with_capacity(batch.column_count());
        for col in 0..batch.column_count() {
            let name = batch.column_name(col);
            if self.strip_marker && self.marker.is_none() && name == TOTAL_COUNT_COLUMN {
                self.marker = Some(col);
                continue;
            }
            columns.push(ColumnInfo::new(name, batch.column_type(col)));
        }
        self.columns = Some(columns);
    }

    /// Rows accumulated so far.
    pub fn rows_collected(&self) -> usize {
        self.rows.len()
    }

    /// Finishes collection.
    ///
    /// `count` is the injected total when present, otherwise the number of
    /// rows collected.
    pub fn finish(self) -> QueryResult {
        let count = self.marker_count.unwrap_or(self.rows.len() as u64);
        QueryResult {
            columns: self.columns.unwrap_or_default(),
            rows: self.rows,
            count,
        }
    }
}

/// Interprets a decoded cell as a row count.
pub fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Int(n) => u64::try_from(*n).ok(),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
        _ => None,
    }
}

/// Reads the first cell of a single-row count result.
pub fn scalar_count(result: &QueryResult) -> Option<u64> {
    result
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(count_from_value)
}
