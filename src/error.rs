use thiserror::Error;
use uuid::Uuid;

/// Enumerates all errors that this crate may return.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The store could not be reached or the connection broke mid-operation.
    #[error("cannot reach the store")]
    Connection(#[source] sqlx::Error),

    /// The requested isolation level could not be honored because of concurrent contention.
    ///
    /// This one is safe to retry.
    #[error("transaction conflict")]
    TransactionConflict(#[source] sqlx::Error),

    /// No job could be claimed within the given timeout.
    ///
    /// Means "no work right now" rather than a failure.
    #[error("no job was claimed within the timeout")]
    QueueEmpty,

    /// The claim has been taken over by another worker (or already settled).
    ///
    /// The result of processing this job must be discarded.
    #[error("claim on job {job_id} is no longer valid")]
    StaleClaim {
        /// Identifier of the job the claim was on.
        job_id: Uuid,
    },

    /// No queue provider is registered for this queue name.
    #[error("no provider registered for queue '{name}'")]
    UnknownQueue {
        /// Name of the queue.
        name: String,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Application error.
    #[error("cannot process: {msg}")]
    Unprocessable {
        /// Details on what exactly went wrong.
        msg: &'static str,
    },

    /// Any other sqlx PostgreSQL driver error.
    #[error("db driver error")]
    Sqlx(#[source] sqlx::Error),
}

impl Error {
    /// Whether the failed operation can be safely re-attempted right away.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionConflict(_))
    }
}

// See https://www.postgresql.org/docs/current/errcodes-appendix.html
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const CONNECTION_EXCEPTION_CLASS: &str = "08";

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::Connection(e),
            sqlx::Error::Database(db_error) => match db_error.code().as_deref() {
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE) => {
                    Error::TransactionConflict(e)
                }
                Some(code) if code.starts_with(CONNECTION_EXCEPTION_CLASS) => Error::Connection(e),
                _ => Error::Sqlx(e),
            },
            _ => Error::Sqlx(e),
        }
    }
}
