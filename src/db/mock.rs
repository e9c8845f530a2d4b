//! Mock database driver for testing.
//!
//! Provides an in-memory engine whose statements are journaled, so tests can
//! observe exactly which effects were committed or rolled back.

use super::collector::{NativeBatch, ResultCollector};
use super::types::{Row, Value};
use super::{DatabaseBackend, EngineDriver};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

/// An already-decoded native batch.
#[derive(Debug, Clone, Default)]
pub struct MemoryBatch {
    columns: Vec<(String, String)>,
    rows: Vec<Row>,
}

impl MemoryBatch {
    /// Creates a batch from `(name, type)` column pairs and rows.
    pub fn new(columns: &[(&str, &str)], rows: Vec<Row>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
            rows,
        }
    }

    /// A one-column, one-row batch holding a count.
    pub fn count(n: i64) -> Self {
        Self::new(&[("count", "int8")], vec![vec![Value::Int(n)]])
    }
}

impl NativeBatch for MemoryBatch {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_name(&self, col: usize) -> &str {
        &self.columns[col].0
    }

    fn column_type(&self, col: usize) -> String {
        self.columns[col].1.clone()
    }

    fn decode(&self, row: usize, col: usize) -> Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Observable state of a [`MockDriver`], shared with the test that created it.
#[derive(Debug, Default)]
pub struct MockState {
    /// Every statement and query received, in order, including BEGIN/COMMIT/ROLLBACK.
    pub executed: Vec<String>,
    /// Statements whose effects are durable.
    pub committed: Vec<String>,
    /// Statements applied inside the open transaction.
    pub pending: Vec<String>,
    /// Whether the engine session has an open transaction.
    pub in_transaction: bool,
    /// Whether the session was closed.
    pub closed: bool,
}

type Responder = dyn Fn(&str) -> Result<Vec<MemoryBatch>> + Send;

/// A mock driver that answers queries through a responder closure.
pub struct MockDriver {
    backend: DatabaseBackend,
    responder: Box<Responder>,
    failing: Vec<String>,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates a mock driver whose queries return no rows.
    pub fn new(backend: DatabaseBackend) -> Self {
        Self::with_responder(backend, |_| Ok(Vec::new()))
    }

    /// Creates a mock driver that answers queries with `responder`.
    pub fn with_responder<F>(backend: DatabaseBackend, responder: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<MemoryBatch>> + Send + 'static,
    {
        Self {
            backend,
            responder: Box::new(responder),
            failing: Vec::new(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Makes any statement or query containing `fragment` fail.
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.failing.push(fragment.into());
        self
    }

    /// Shared handle to the journal.
    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        match self.failing.iter().find(|f| sql.contains(f.as_str())) {
            Some(fragment) => Err(BridgeError::query(format!(
                "{} query failed: mock failure on '{fragment}'",
                self.backend.display_name()
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EngineDriver for MockDriver {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn run_query(&mut self, sql: &str, collector: &mut ResultCollector) -> Result<()> {
        self.lock().executed.push(sql.to_string());
        self.check_failure(sql)?;
        for batch in (self.responder)(sql)? {
            collector.push_batch(&batch);
        }
        Ok(())
    }

    async fn run_statement(&mut self, sql: &str) -> Result<()> {
        self.lock().executed.push(sql.to_string());
        self.check_failure(sql)?;
        let mut state = self.lock();
        if state.in_transaction {
            state.pending.push(sql.to_string());
        } else {
            state.committed.push(sql.to_string());
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.executed.push("BEGIN".to_string());
        if state.in_transaction {
            return Err(BridgeError::query(
                "Mock query failed: there is already a transaction in progress",
            ));
        }
        state.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.executed.push("COMMIT".to_string());
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.executed.push("ROLLBACK".to_string());
        state.pending.clear();
        state.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        // an engine discards uncommitted work when the session ends
        state.pending.clear();
        state.in_transaction = false;
        state.closed = true;
        Ok(())
    }
}
