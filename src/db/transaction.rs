//! Transaction lifecycle management.
//!
//! A strict `Idle`/`Active` state machine layered over one engine session.
//! Only this module mutates the transaction state.

use super::EngineDriver;
use crate::error::{BridgeError, Result};
use tracing::{debug, info, warn};

/// Transaction state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Active,
}

/// Explicit begin/commit/rollback discipline over a driver.
#[derive(Debug, Default)]
pub struct TransactionManager {
    state: TransactionState,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// `Idle -> Active`. Fails without touching the engine if already active.
    pub async fn begin(&mut self, driver: &mut dyn EngineDriver) -> Result<()> {
        if self.is_active() {
            return Err(BridgeError::transaction("Transaction already active"));
        }
        driver.begin().await?;
        self.state = TransactionState::Active;
        info!("Transaction started");
        Ok(())
    }

    /// `Active -> Idle`. On engine failure the transaction stays active so the
    /// caller can still roll it back.
    pub async fn commit(&mut self, driver: &mut dyn EngineDriver) -> Result<()> {
        if !self.is_active() {
            return Err(BridgeError::transaction("No active transaction to commit"));
        }
        driver.commit().await?;
        self.state = TransactionState::Idle;
        info!("Transaction committed");
        Ok(())
    }

    /// `Active -> Idle`.
    pub async fn rollback(&mut self, driver: &mut dyn EngineDriver) -> Result<()> {
        if !self.is_active() {
            return Err(BridgeError::transaction("No active transaction to rollback"));
        }
        driver.rollback().await?;
        self.state = TransactionState::Idle;
        info!("Transaction rolled back");
        Ok(())
    }

    /// Executes `statements` in order, atomically.
    ///
    /// With no transaction active, one is opened and committed only if every
    /// statement succeeds. Inside a caller's transaction the statements join
    /// it and the caller keeps the commit boundary. Any failure rolls the
    /// transaction back.
    pub async fn execute_batch<S: AsRef<str>>(
        &mut self,
        driver: &mut dyn EngineDriver,
        statements: &[S],
    ) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }

        let owns_transaction = !self.is_active();
        if owns_transaction {
            self.begin(driver)
                .await
                .map_err(|e| BridgeError::batch(format!("could not open transaction: {e}")))?;
        }

        let total = statements.len();
        for (idx, statement) in statements.iter().enumerate() {
            let statement = statement.as_ref();
            debug!("Batch statement {}/{}: {}", idx + 1, total, statement);
            if let Err(e) = driver.run_statement(statement).await {
                self.abort(driver).await;
                return Err(BridgeError::batch(format!(
                    "statement {} of {} failed, batch rolled back: {e}",
                    idx + 1,
                    total
                )));
            }
        }

        if owns_transaction {
            if let Err(e) = self.commit(driver).await {
                self.abort(driver).await;
                return Err(BridgeError::batch(format!(
                    "commit failed, batch rolled back: {e}"
                )));
            }
        }
        Ok(())
    }

    /// Rolls back if active; used on teardown. Always leaves the state `Idle`.
    pub async fn release(&mut self, driver: &mut dyn EngineDriver) {
        if self.is_active() {
            warn!("Connection released with an active transaction, rolling back");
            self.abort(driver).await;
        }
    }

    async fn abort(&mut self, driver: &mut dyn EngineDriver) {
        if let Err(e) = self.rollback(driver).await {
            warn!("Rollback failed: {}", e);
        }
        // the engine session is closed or broken at this point
        self.state = TransactionState::Idle;
    }

    /// Forgets the state without talking to the engine.
    pub(crate) fn reset(&mut self) {
        self.state = TransactionState::Idle;
    }
}
