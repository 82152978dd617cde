use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::sync::Arc;

use crate::stmt::Statements;
use crate::{ConnectionManager, Error, JobDetails, JobId};

/// Queue occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name.
    pub name: String,

    /// Number of jobs waiting to be fetched.
    pub enqueued: u64,

    /// Number of jobs currently claimed, including claims that have already expired
    /// but were not re-fetched yet.
    pub fetched: u64,
}

impl FromRow<'_, PgRow> for QueueStats {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let name: String = row.try_get("queue")?;
        let enqueued: i64 = row.try_get("enqueued")?;
        let fetched: i64 = row.try_get("fetched")?;
        Ok(QueueStats {
            name,
            enqueued: enqueued as u64,
            fetched: fetched as u64,
        })
    }
}

/// Read-only view on the storage.
#[derive(Debug, Clone)]
pub struct MonitoringApi {
    manager: ConnectionManager,
    stmt: Arc<Statements>,
}

impl MonitoringApi {
    pub(crate) fn new(manager: ConnectionManager, stmt: Arc<Statements>) -> Self {
        MonitoringApi { manager, stmt }
    }

    /// Return stats on every non-empty queue.
    pub async fn queues(&self) -> Result<Vec<QueueStats>, Error> {
        let stmt = Arc::clone(&self.stmt);
        self.manager
            .with_connection(move |conn| {
                Box::pin(async move {
                    let queues: Vec<QueueStats> =
                        sqlx::query_as(&stmt.get_queues).fetch_all(conn).await?;
                    Ok(queues)
                })
            })
            .await
    }

    /// Return stats on the queue with this name.
    ///
    /// A queue nobody has ever enqueued to is simply empty.
    pub async fn queue<Q>(&self, queue_name: Q) -> Result<QueueStats, Error>
    where
        Q: Into<String>,
    {
        let stmt = Arc::clone(&self.stmt);
        let queue_name = queue_name.into();
        self.manager
            .with_connection(move |conn| {
                Box::pin(async move {
                    let stats: QueueStats = sqlx::query_as(&stmt.get_queue)
                        .bind(queue_name)
                        .fetch_one(conn)
                        .await?;
                    Ok(stats)
                })
            })
            .await
    }

    /// Get this job's details, if it (still) exists.
    pub async fn job(&self, job_id: JobId) -> Result<Option<JobDetails>, Error> {
        let stmt = Arc::clone(&self.stmt);
        self.manager
            .with_connection(move |conn| {
                Box::pin(async move {
                    let job: Option<JobDetails> = sqlx::query_as(&stmt.get_job)
                        .bind(job_id)
                        .fetch_optional(conn)
                        .await?;
                    Ok(job)
                })
            })
            .await
    }

    /// Current value of the counter, whether already aggregated or not.
    pub async fn counter<K>(&self, key: K) -> Result<i64, Error>
    where
        K: Into<String>,
    {
        let stmt = Arc::clone(&self.stmt);
        let key = key.into();
        self.manager
            .with_connection(move |conn| {
                Box::pin(async move {
                    let value: i64 = sqlx::query_scalar(&stmt.get_counter)
                        .bind(key)
                        .fetch_one(conn)
                        .await?;
                    Ok(value)
                })
            })
            .await
    }
}
