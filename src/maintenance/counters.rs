use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::MaintenanceComponent;
use crate::stmt::Statements;
use crate::{ConnectionManager, Error};

/// Folds raw counter increments into one aggregated value per key.
///
/// The aggregated total of a key plus its not-yet-folded increments always equals
/// the sum of everything ever recorded for it: a fold deletes exactly the raw rows it
/// adds up, in the same transaction.
#[derive(Debug, Clone)]
pub struct CountersAggregator {
    manager: ConnectionManager,
    stmt: Arc<Statements>,
    interval: Duration,
    batch_size: u64,
    conflict_retries: usize,
}

impl CountersAggregator {
    pub(crate) fn new(
        manager: ConnectionManager,
        stmt: Arc<Statements>,
        interval: Duration,
        batch_size: usize,
        conflict_retries: usize,
    ) -> Self {
        CountersAggregator {
            manager,
            stmt,
            interval,
            batch_size: batch_size.clamp(1, i64::MAX as usize) as u64,
            conflict_retries,
        }
    }

    async fn fold_batch(&self) -> Result<u64, Error> {
        let stmt = Arc::clone(&self.stmt);
        let limit = self.batch_size as i64;
        self.manager
            .with_transaction_retried(
                self.manager.isolation_level(),
                self.conflict_retries + 1,
                move |conn| {
                    let stmt = Arc::clone(&stmt);
                    Box::pin(async move {
                        let consumed: i64 = sqlx::query_scalar(&stmt.aggregate_counters)
                            .bind(limit)
                            .fetch_one(conn)
                            .await?;
                        Ok(consumed as u64)
                    })
                },
            )
            .await
    }
}

#[async_trait]
impl MaintenanceComponent for CountersAggregator {
    fn name(&self) -> &'static str {
        "counters aggregator"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, cancel: &CancellationToken) -> Result<u64, Error> {
        let mut consumed = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(consumed);
            }
            let folded = self.fold_batch().await?;
            consumed += folded;
            if folded < self.batch_size {
                return Ok(consumed);
            }
        }
    }
}
