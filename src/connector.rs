//! Synchronous connector façade.
//!
//! A [`Connector`] exclusively owns one engine session and its transaction
//! state. Every operation blocks until the engine has answered; calls on one
//! connector are observed by the engine in the order they were made.
//!
//! The connector drives its driver on a private current-thread runtime, so it
//! must not be used from inside another tokio runtime.

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, QuerySettings};
use crate::db::{self, DatabaseBackend, EngineDriver, QueryResult, TransactionManager};
use crate::error::{BridgeError, Result};
use crate::json;
use crate::query::QueryExecutor;

/// Blocking query façade over one engine connection.
pub struct Connector {
    runtime: Runtime,
    settings: QuerySettings,
    driver: Option<Box<dyn EngineDriver>>,
    transaction: TransactionManager,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("backend", &self.backend())
            .field("transaction", &self.transaction.state())
            .finish()
    }
}

impl Connector {
    /// Creates a disconnected connector with default settings.
    pub fn new() -> Result<Self> {
        Self::with_settings(QuerySettings::default())
    }

    /// Creates a disconnected connector.
    pub fn with_settings(settings: QuerySettings) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::internal(format!("Failed to start runtime: {e}")))?;
        Ok(Self {
            runtime,
            settings,
            driver: None,
            transaction: TransactionManager::new(),
        })
    }

    /// Connects to the engine described by `config`, replacing any current
    /// connection.
    pub fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.disconnect();
        info!("Connecting to {}", config.display_string());
        let driver = self.runtime.block_on(db::connect(config, &self.settings))?;
        self.driver = Some(driver);
        Ok(())
    }

    /// Connects using an engine-specific connection string.
    pub fn connect_url(&mut self, conn_str: &str) -> Result<()> {
        let config = ConnectionConfig::from_connection_string(conn_str)?;
        self.connect(&config)
    }

    /// Takes ownership of an already-open driver, replacing any current
    /// connection.
    pub fn attach(&mut self, driver: Box<dyn EngineDriver>) {
        self.disconnect();
        self.driver = Some(driver);
    }

    /// Rolls back an active transaction and releases the connection.
    ///
    /// Safe to call at any time, any number of times.
    pub fn disconnect(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        let transaction = &mut self.transaction;
        self.runtime.block_on(async {
            transaction.release(driver.as_mut()).await;
            if let Err(e) = driver.close().await {
                warn!("Error while closing connection: {}", e);
            }
        });
        self.transaction.reset();
        debug!("Disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    /// The engine behind the current connection.
    pub fn backend(&self) -> Option<DatabaseBackend> {
        self.driver.as_ref().map(|d| d.backend())
    }

    /// Executes a read query, returning its rows and unpaginated total count.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let in_transaction = self.transaction.is_active();
        let driver = self
            .driver
            .as_deref_mut()
            .ok_or_else(|| BridgeError::query("Not connected"))?;
        self.runtime
            .block_on(QueryExecutor::new(driver, in_transaction).execute(sql))
    }

    /// [`execute`](Self::execute) followed by JSON encoding.
    pub fn execute_to_json(&mut self, sql: &str) -> Result<String> {
        let result = self.execute(sql)?;
        json::encode(&result)
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        let driver = connected(&mut self.driver)?;
        self.runtime.block_on(self.transaction.begin(driver))
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        let driver = connected(&mut self.driver)?;
        self.runtime.block_on(self.transaction.commit(driver))
    }

    pub fn rollback_transaction(&mut self) -> Result<()> {
        let driver = connected(&mut self.driver)?;
        self.runtime.block_on(self.transaction.rollback(driver))
    }

    pub fn is_in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    /// Executes `statements` atomically. See
    /// [`TransactionManager::execute_batch`].
    pub fn execute_batch<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<()> {
        let driver = connected(&mut self.driver)?;
        self.runtime
            .block_on(self.transaction.execute_batch(driver, statements))
    }
}

fn connected(
    driver: &mut Option<Box<dyn EngineDriver>>,
) -> Result<&mut (dyn EngineDriver + 'static)> {
    driver
        .as_deref_mut()
        .ok_or_else(|| BridgeError::connection("Not connected"))
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockDriver, TransactionState};

    #[test]
    fn test_operations_require_connection() {
        let mut connector = Connector::new().unwrap();

        assert!(!connector.is_connected());
        assert!(matches!(
            connector.execute("SELECT 1"),
            Err(BridgeError::Query(_))
        ));
        assert!(matches!(
            connector.begin_transaction(),
            Err(BridgeError::Connection(_))
        ));
        assert!(!connector.is_in_transaction());
        assert!(connector.execute_batch(&["SELECT 1"]).is_err());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut connector = Connector::new().unwrap();
        let driver = MockDriver::new(DatabaseBackend::Postgres);
        let state = driver.state();
        connector.attach(Box::new(driver));

        connector.disconnect();
        connector.disconnect();

        assert!(!connector.is_connected());
        assert!(state.lock().unwrap().closed);
    }

    #[test]
    fn test_disconnect_rolls_back_active_transaction() {
        let mut connector = Connector::new().unwrap();
        let driver = MockDriver::new(DatabaseBackend::Postgres);
        let state = driver.state();
        connector.attach(Box::new(driver));

        connector.begin_transaction().unwrap();
        connector.execute_batch(&["INSERT INTO t VALUES (1)"]).unwrap();
        connector.disconnect();

        assert_eq!(connector.transaction.state(), TransactionState::Idle);
        let state = state.lock().unwrap();
        assert!(state.committed.is_empty());
        assert!(state.executed.iter().any(|s| s == "ROLLBACK"));
    }

    #[test]
    fn test_attach_replaces_previous_connection() {
        let mut connector = Connector::new().unwrap();
        let first = MockDriver::new(DatabaseBackend::Postgres);
        let first_state = first.state();
        connector.attach(Box::new(first));
        connector.attach(Box::new(MockDriver::new(DatabaseBackend::ClickHouse)));

        assert!(first_state.lock().unwrap().closed);
        assert_eq!(connector.backend(), Some(DatabaseBackend::ClickHouse));
    }
}
