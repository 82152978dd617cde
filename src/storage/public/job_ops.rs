use super::Storage;
use crate::{Error, FetchedJob, JobId, WriteTransaction};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

impl Storage {
    /// Create a job that gets cleaned up after `expire_in` unless persisted.
    ///
    /// Jobs are created this way so that one abandoned before getting its state
    /// (e.g. the creating process crashed) does not linger forever.
    pub async fn create_expired_job<D>(&self, data: D, expire_in: Duration) -> Result<JobId, Error>
    where
        D: Into<serde_json::Value>,
    {
        let stmt = Arc::clone(&self.stmt);
        let data = data.into();
        let job_id = self
            .manager
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let id: JobId = sqlx::query_scalar(&stmt.create_job)
                        .bind(data)
                        .bind(expire_in.as_secs_f64())
                        .fetch_one(conn)
                        .await?;
                    Ok(id)
                })
            })
            .await?;
        tracing::debug!(%job_id, "created job");
        Ok(job_id)
    }

    /// Start buffering writes to be committed atomically.
    pub fn write_transaction(&self) -> WriteTransaction {
        WriteTransaction::new(
            self.manager.clone(),
            Arc::clone(&self.stmt),
            Arc::clone(&self.registry),
        )
    }

    /// Claim the next job from these queues, waiting for up to `timeout`.
    ///
    /// Earlier listed queues take precedence. See [`crate::JobQueue::dequeue`].
    pub async fn dequeue<I, Q>(
        &self,
        queue_names: I,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedJob, Error>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        let queue_names: Vec<String> = queue_names.into_iter().map(Into::into).collect();
        let provider = self.registry.resolve(&queue_names)?;
        provider
            .job_queue()
            .dequeue(&queue_names, timeout, cancel)
            .await
    }

    /// Claim the next job from these queues, waiting for up to the configured
    /// `fetch_next_job_timeout`.
    pub async fn fetch_next_job<I, Q>(
        &self,
        queue_names: I,
        cancel: &CancellationToken,
    ) -> Result<FetchedJob, Error>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        self.dequeue(queue_names, self.opts.fetch_next_job_timeout, cancel)
            .await
    }
}
