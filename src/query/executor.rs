//! Query execution with count injection.
//!
//! Turns one caller query into the engine round trips planned by
//! [`plan_count`] and folds their results into a single [`QueryResult`].

use std::time::Instant;

use tracing::{debug, warn};

use crate::db::rewrite::plan_count;
use crate::db::{scalar_count, CountPlan, EngineDriver, QueryResult, ResultCollector};
use crate::error::Result;

/// Runs read queries against one driver.
pub struct QueryExecutor<'a> {
    driver: &'a mut dyn EngineDriver,
    in_transaction: bool,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    ///
    /// `in_transaction` disables the retry of a failed rewritten query: an
    /// engine may have aborted the open transaction, and a second statement
    /// would only mask the original error.
    pub fn new(driver: &'a mut dyn EngineDriver, in_transaction: bool) -> Self {
        Self {
            driver,
            in_transaction,
        }
    }

    /// Executes `sql`, returning its rows and the unpaginated total count.
    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let plan = plan_count(sql, self.driver.backend().count_strategy());

        let result = match plan {
            CountPlan::Passthrough { query } => self.collect(&query).await?,
            CountPlan::Windowed {
                query,
                recount_query,
            } => self.execute_windowed(sql, &query, recount_query).await?,
            CountPlan::Separate { count_query, query } => {
                self.execute_separate(&count_query, &query).await?
            }
        };

        debug!(
            "Query returned {} rows (count {}) in {:?}",
            result.row_count(),
            result.count,
            start.elapsed()
        );
        Ok(result)
    }

    async fn collect(&mut self, sql: &str) -> Result<QueryResult> {
        let mut collector = ResultCollector::new();
        self.driver.run_query(sql, &mut collector).await?;
        Ok(collector.finish())
    }

    async fn execute_windowed(
        &mut self,
        original: &str,
        query: &str,
        recount_query: Option<String>,
    ) -> Result<QueryResult> {
        debug!("Count injection (window): {}", query);
        let mut collector = ResultCollector::with_count_marker();

        if let Err(e) = self.driver.run_query(query, &mut collector).await {
            if self.in_transaction {
                return Err(e);
            }
            warn!("Rewritten query failed ({}), running it unmodified", e);
            return self.collect(original).await;
        }

        let mut result = collector.finish();
        if let (true, Some(recount)) = (result.rows.is_empty(), recount_query) {
            // an empty page past the end carries no window count
            debug!("Empty page, recounting: {}", recount);
            match self.collect(&recount).await {
                Ok(counted) => {
                    if let Some(total) = scalar_count(&counted) {
                        result.count = total;
                    }
                }
                Err(e) => warn!("Recount failed, reporting 0: {}", e),
            }
        }
        Ok(result)
    }

    async fn execute_separate(&mut self, count_query: &str, query: &str) -> Result<QueryResult> {
        debug!("Count query: {}", count_query);
        let total = match self.collect(count_query).await {
            Ok(counted) => scalar_count(&counted),
            Err(e) => {
                warn!("Count query failed, using returned row count: {}", e);
                None
            }
        };

        let result = self.collect(query).await?;
        Ok(match total {
            Some(total) => result.with_count(total),
            None => result,
        })
    }
}
