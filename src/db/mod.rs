//! Database abstraction layer for qbridge.
//!
//! Provides a trait-based interface over each engine's native client, so the
//! query pipeline and transaction manager work the same against every backend.

mod clickhouse;
mod collector;
pub(crate) mod mock;
mod normalize;
mod postgres;
pub mod rewrite;
mod transaction;
mod types;

pub use clickhouse::{ChBatch, ChKind, ClickHouseClient};
pub use collector::{count_from_value, scalar_count, NativeBatch, ResultCollector};
pub use mock::{MemoryBatch, MockDriver, MockState};
pub use normalize::{
    normalize_clickhouse_type, normalize_pg_type, pg_builtin_type_name, EmptyCatalog, TypeCatalog,
};
pub use postgres::{PgKind, PostgresClient};
pub use rewrite::{CountPlan, CountStrategy, TOTAL_COUNT_COLUMN};
pub use transaction::{TransactionManager, TransactionState};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::{ConnectionConfig, QuerySettings};
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    ClickHouse,
}

impl DatabaseBackend {
    /// Returns the backend name as written in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::ClickHouse => "clickhouse",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "clickhouse" | "ch" => Some(Self::ClickHouse),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::ClickHouse => 8123,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::ClickHouse => "clickhouse",
        }
    }

    /// Human-readable engine name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::ClickHouse => "ClickHouse",
        }
    }

    /// How this engine obtains the unpaginated total row count.
    pub fn count_strategy(&self) -> CountStrategy {
        match self {
            Self::Postgres => CountStrategy::Window,
            Self::ClickHouse => CountStrategy::SeparateQuery,
        }
    }
}

/// Creates a database driver for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(
    config: &ConnectionConfig,
    settings: &QuerySettings,
) -> Result<Box<dyn EngineDriver>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config, settings).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::ClickHouse => {
            let client = ClickHouseClient::connect(config, settings).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface to one engine connection.
///
/// A driver owns exactly one session with its engine. Calls are issued one
/// at a time, in order.
#[async_trait]
pub trait EngineDriver: Send {
    /// The engine behind this driver.
    fn backend(&self) -> DatabaseBackend;

    /// Executes a read query, pushing every native result batch into `collector`.
    async fn run_query(&mut self, sql: &str, collector: &mut ResultCollector) -> Result<()>;

    /// Executes a statement whose rows (if any) are discarded.
    async fn run_statement(&mut self, sql: &str) -> Result<()>;

    /// Opens a transaction on the engine session.
    async fn begin(&mut self) -> Result<()> {
        self.run_statement("BEGIN").await
    }

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()> {
        self.run_statement("COMMIT").await
    }

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()> {
        self.run_statement("ROLLBACK").await
    }

    /// Releases the engine session.
    async fn close(&mut self) -> Result<()>;
}

/// Runs `attempt` until it succeeds, retrying only transient failures with
/// exponential backoff.
pub(crate) async fn connect_with_retry<T, E, F, Fut>(
    settings: &QuerySettings,
    mut attempt: F,
    is_transient: fn(&E) -> bool,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let attempts = settings.connect_attempts.max(1);
    let mut delay = settings.retry_base_delay();
    let mut n = 1;

    loop {
        debug!("Connection attempt {} of {}", n, attempts);
        match attempt().await {
            Ok(conn) => return Ok(conn),
            Err(e) if n < attempts && is_transient(&e) => {
                warn!(
                    "Connection attempt {} failed (transient error), retrying in {:?}",
                    n, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
