use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::MaintenanceComponent;
use crate::stmt::Statements;
use crate::{ConnectionManager, Error};

/// Deletes jobs, aggregated counters, sets, lists and hashes whose expiry has passed.
#[derive(Debug, Clone)]
pub struct ExpirationManager {
    manager: ConnectionManager,
    stmt: Arc<Statements>,
    interval: Duration,
    batch_size: u64,
    conflict_retries: usize,
}

impl ExpirationManager {
    pub(crate) fn new(
        manager: ConnectionManager,
        stmt: Arc<Statements>,
        interval: Duration,
        batch_size: usize,
        conflict_retries: usize,
    ) -> Self {
        ExpirationManager {
            manager,
            stmt,
            interval,
            batch_size: batch_size.clamp(1, i64::MAX as usize) as u64,
            conflict_retries,
        }
    }

    /// Empty one table of its expired records, batch by batch.
    async fn sweep(&self, table_idx: usize, cancel: &CancellationToken) -> Result<u64, Error> {
        let (table, _) = &self.stmt.delete_expired[table_idx];
        let mut removed = 0;
        while !cancel.is_cancelled() {
            let deleted = self.delete_batch(table_idx).await?;
            removed += deleted;
            if deleted > 0 {
                tracing::debug!(table, deleted, "removed expired records");
            }
            if deleted < self.batch_size {
                break;
            }
        }
        Ok(removed)
    }

    async fn delete_batch(&self, table_idx: usize) -> Result<u64, Error> {
        let stmt = Arc::clone(&self.stmt);
        let limit = self.batch_size as i64;
        self.manager
            .with_transaction_retried(
                self.manager.isolation_level(),
                self.conflict_retries + 1,
                move |conn| {
                    let stmt = Arc::clone(&stmt);
                    Box::pin(async move {
                        let (_, sql) = &stmt.delete_expired[table_idx];
                        let done = sqlx::query(sql).bind(limit).execute(conn).await?;
                        Ok(done.rows_affected())
                    })
                },
            )
            .await
    }
}

#[async_trait]
impl MaintenanceComponent for ExpirationManager {
    fn name(&self) -> &'static str {
        "expiration manager"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, cancel: &CancellationToken) -> Result<u64, Error> {
        let mut removed = 0;
        let mut failure = None;
        for (table_idx, (table, _)) in self.stmt.delete_expired.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            match self.sweep(table_idx, cancel).await {
                Ok(deleted) => removed += deleted,
                Err(e) => {
                    tracing::warn!(table, error = %e, "failed to remove expired records");
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}
