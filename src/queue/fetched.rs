use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Claim, JobQueue, Settle};
use crate::{Error, JobId};

/// A job claimed by this worker.
///
/// Settle it with either [`FetchedJob::acknowledge`] once processed or
/// [`FetchedJob::requeue`] to hand it back. A handle dropped unsettled within a
/// Tokio runtime releases its claim in the background; otherwise (or if the
/// process dies) the claim simply expires after the invisibility timeout and the
/// job gets delivered again.
#[derive(Debug)]
pub struct FetchedJob {
    claim: Claim,
    job_queue: JobQueue,
    settled: bool,
}

impl FetchedJob {
    pub(crate) fn new(claim: Claim, job_queue: JobQueue) -> Self {
        FetchedJob {
            claim,
            job_queue,
            settled: false,
        }
    }

    /// Identifier of the claimed job.
    pub fn job_id(&self) -> JobId {
        self.claim.job_id
    }

    /// Queue the job was fetched from.
    pub fn queue(&self) -> &str {
        &self.claim.queue
    }

    /// Token identifying this particular claim.
    pub fn fetch_token(&self) -> Uuid {
        self.claim.fetch_token
    }

    /// When the claim was made, according to the store.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.claim.fetched_at
    }

    /// Remove the job from the queue for good.
    ///
    /// Fails with [`Error::StaleClaim`] if the claim expired and someone else has
    /// re-fetched the job in the meantime, or if it has already been settled.
    pub async fn acknowledge(&mut self) -> Result<(), Error> {
        self.settle(Settle::Remove).await
    }

    /// Release the claim, making the job immediately available to other workers.
    ///
    /// Fails with [`Error::StaleClaim`] under the same conditions as
    /// [`FetchedJob::acknowledge`].
    pub async fn requeue(&mut self) -> Result<(), Error> {
        self.settle(Settle::Requeue).await
    }

    async fn settle(&mut self, how: Settle) -> Result<(), Error> {
        let still_ours = self
            .job_queue
            .settle(how, self.claim.entry_id, self.claim.fetch_token)
            .await?;
        self.settled = true;
        if still_ours {
            Ok(())
        } else {
            Err(Error::StaleClaim {
                job_id: self.claim.job_id,
            })
        }
    }
}

impl Drop for FetchedJob {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(job_id = %self.claim.job_id, "no runtime to release claim, leaving it to expire");
            return;
        };
        let job_queue = self.job_queue.clone();
        let Claim {
            entry_id,
            job_id,
            fetch_token,
            ..
        } = self.claim.clone();
        runtime.spawn(async move {
            match job_queue
                .settle(Settle::Requeue, entry_id, fetch_token)
                .await
            {
                Ok(true) => tracing::debug!(%job_id, "released abandoned claim"),
                Ok(false) => tracing::debug!(%job_id, "abandoned claim was already taken over"),
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "failed to release abandoned claim, leaving it to expire")
                }
            }
        });
    }
}
