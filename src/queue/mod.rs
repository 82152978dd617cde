use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{FromRow, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::stmt::Statements;
use crate::{ConnectionManager, Error, JobId, StorageConnection};

mod fetched;
mod registry;

pub use fetched::FetchedJob;
pub use registry::{QueueProvider, QueueProviderRegistry};

/// Settings of the fetch protocol.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchOptions {
    /// For how long a claim stays valid.
    pub(crate) invisibility_timeout: Duration,
    /// Pause between two polls that found nothing.
    pub(crate) poll_interval: Duration,
    /// How many conflicting attempts are retried before giving up.
    pub(crate) conflict_retries: usize,
}

/// A claimed queue entry, as returned by the store.
#[derive(Debug, Clone)]
pub(crate) struct Claim {
    pub(crate) entry_id: i64,
    pub(crate) job_id: JobId,
    pub(crate) queue: String,
    pub(crate) fetch_token: Uuid,
    pub(crate) fetched_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Claim {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        Ok(Claim {
            entry_id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            queue: row.try_get("queue")?,
            fetch_token: row.try_get("fetch_token")?,
            fetched_at: row.try_get("fetched_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settle {
    Remove,
    Requeue,
}

/// Job queue living in the relational store.
///
/// Any number of processes may poll the same queues: a pending entry is handed
/// to at most one of them at a time, and an entry whose claim outlived the
/// invisibility timeout is up for grabs again.
#[derive(Debug, Clone)]
pub struct JobQueue {
    manager: ConnectionManager,
    stmt: Arc<Statements>,
    opts: FetchOptions,
}

impl JobQueue {
    pub(crate) fn new(manager: ConnectionManager, stmt: Arc<Statements>, opts: FetchOptions) -> Self {
        JobQueue {
            manager,
            stmt,
            opts,
        }
    }

    /// For how long a claim handed out by this queue stays valid.
    pub fn invisibility_timeout(&self) -> Duration {
        self.opts.invisibility_timeout
    }

    /// Put a job onto a queue.
    ///
    /// Runs on the given connection, so that the entry is only visible once
    /// the caller's transaction commits.
    pub async fn enqueue(
        &self,
        conn: &mut PgConnection,
        queue_name: &str,
        job_id: JobId,
    ) -> Result<(), Error> {
        sqlx::query(&self.stmt.enqueue)
            .bind(job_id)
            .bind(queue_name)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Claim the next pending job from `queue_names`.
    ///
    /// Earlier listed queues take precedence, and within a queue the oldest entry wins.
    /// Polls every `poll_interval` until a job gets claimed, `timeout` elapses
    /// ([`Error::QueueEmpty`]), or `cancel` fires ([`Error::Cancelled`]), which also
    /// applies while waiting for a connection. A claim transaction that has started
    /// always runs to completion, so no claim is ever left half-made.
    pub async fn dequeue(
        &self,
        queue_names: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedJob, Error> {
        if queue_names.is_empty() {
            return Err(Error::Unprocessable {
                msg: "at least one queue name is required",
            });
        }
        let deadline = Instant::now() + timeout;
        let mut conflicts = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            // waiting for a connection counts against the timeout and can be cancelled,
            // the claim itself cannot
            let conn = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(Error::QueueEmpty),
                conn = self.manager.acquire() => conn?,
            };
            match self.try_claim(conn, queue_names).await {
                Ok(Some(claim)) => {
                    tracing::debug!(
                        job_id = %claim.job_id,
                        queue = %claim.queue,
                        "claimed job"
                    );
                    return Ok(FetchedJob::new(claim, self.clone()));
                }
                Ok(None) => {}
                Err(e) if e.is_retryable() && conflicts < self.opts.conflict_retries => {
                    conflicts += 1;
                    tracing::debug!(conflicts, "conflict while claiming, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::QueueEmpty);
            }
            let pause = self.opts.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    async fn try_claim(
        &self,
        conn: StorageConnection,
        queue_names: &[String],
    ) -> Result<Option<Claim>, Error> {
        let stmt = Arc::clone(&self.stmt);
        let queue_names = queue_names.to_vec();
        let invisibility_timeout = self.opts.invisibility_timeout.as_secs_f64();
        let fetch_token = Uuid::new_v4();
        self.manager
            .with_transaction_on(conn, self.manager.isolation_level(), move |conn| {
                Box::pin(async move {
                    let claim: Option<Claim> = sqlx::query_as(&stmt.fetch_next_job)
                        .bind(&queue_names)
                        .bind(invisibility_timeout)
                        .bind(fetch_token)
                        .fetch_optional(conn)
                        .await?;
                    Ok(claim)
                })
            })
            .await
    }

    /// Delete or release the entry, provided the claim is still ours.
    ///
    /// Returns `false` if the token no longer matches.
    pub(crate) async fn settle(
        &self,
        how: Settle,
        entry_id: i64,
        fetch_token: Uuid,
    ) -> Result<bool, Error> {
        let stmt = Arc::clone(&self.stmt);
        self.manager
            .with_transaction_retried(
                self.manager.isolation_level(),
                self.opts.conflict_retries + 1,
                move |conn| {
                    let stmt = Arc::clone(&stmt);
                    Box::pin(async move {
                        let sql = match how {
                            Settle::Remove => &stmt.acknowledge,
                            Settle::Requeue => &stmt.requeue,
                        };
                        let done = sqlx::query(sql)
                            .bind(entry_id)
                            .bind(fetch_token)
                            .execute(conn)
                            .await?;
                        Ok(done.rows_affected() == 1)
                    })
                },
            )
            .await
    }
}
