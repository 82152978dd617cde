use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{opts, Storage};
use crate::connection::ConnectionSource;
use crate::{utils, Error, IsolationLevel};

/// Builder for [`Storage`].
#[derive(Debug, Clone, Default)]
pub struct StorageBuilder {
    opts: opts::StorageOptions,
}

impl StorageBuilder {
    /// Schema name.
    pub fn schema<S>(mut self, schema: S) -> Self
    where
        S: Into<String>,
    {
        self.opts.schema = schema.into();
        self
    }

    /// Whether to install the schema on connect if it is not there yet.
    ///
    /// Defaults to `true`.
    pub fn prepare_schema(mut self, prepare: bool) -> Self {
        self.opts.prepare_schema = prepare;
        self
    }

    /// Only serve these queues.
    ///
    /// By default, any queue name is accepted. Once restricted, operations on other
    /// queues fail with [`Error::UnknownQueue`].
    pub fn queues<I, Q>(mut self, queue_names: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        self.opts.queues = Some(queue_names.into_iter().map(Into::into).collect());
        self
    }

    /// For how long a fetched job stays invisible to other workers.
    ///
    /// A claim that is neither acknowledged nor released within this time is
    /// considered abandoned and the job gets delivered again. Defaults to 30 minutes.
    pub fn invisibility_timeout(mut self, timeout: Duration) -> Self {
        self.opts.invisibility_timeout = timeout;
        self
    }

    /// For how long [`Storage::fetch_next_job`] keeps polling. Defaults to 30 seconds.
    pub fn fetch_next_job_timeout(mut self, timeout: Duration) -> Self {
        self.opts.fetch_next_job_timeout = timeout;
        self
    }

    /// Pause between two polls that found nothing. Defaults to 1 second.
    pub fn queue_poll_interval(mut self, interval: Duration) -> Self {
        self.opts.queue_poll_interval = interval;
        self
    }

    /// Pause between two expiration passes. Defaults to 1 hour.
    pub fn job_expiration_check_interval(mut self, interval: Duration) -> Self {
        self.opts.job_expiration_check_interval = interval;
        self
    }

    /// Pause between two counter aggregation passes. Defaults to 5 minutes.
    pub fn counters_aggregate_interval(mut self, interval: Duration) -> Self {
        self.opts.counters_aggregate_interval = interval;
        self
    }

    /// Isolation level for the storage's transactions. Defaults to read committed.
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.opts.isolation_level = level;
        self
    }

    /// How many times a conflicting transaction is retried. Defaults to 3.
    pub fn transaction_conflict_retries(mut self, retries: usize) -> Self {
        self.opts.transaction_conflict_retries = retries;
        self
    }

    /// Maximum number of expired records deleted per transaction. Defaults to 1000.
    pub fn delete_batch_size(mut self, size: usize) -> Self {
        self.opts.delete_batch_size = size;
        self
    }

    /// Maximum number of raw counter rows folded per transaction. Defaults to 1000.
    pub fn aggregate_batch_size(mut self, size: usize) -> Self {
        self.opts.aggregate_batch_size = size;
        self
    }

    /// Connect to the PostgreSQL server.
    ///
    /// See [`Storage::connect`] on how the server address is resolved.
    pub async fn connect(self) -> Result<Storage, Error> {
        let pool = utils::create_pool(None).await?;
        self.with_pool(pool).await
    }

    /// Connect to the PostgreSQL server using specific url.
    ///
    /// To configure `ssl` (e.g. `sslmode=require`), you will need to build
    /// your own `Pool` and use [`StorageBuilder::with_pool`] method instead.
    pub async fn connect_to<S>(self, url: S) -> Result<Storage, Error>
    where
        S: AsRef<str>,
    {
        let pool = utils::create_pool(Some(url.as_ref())).await?;
        self.with_pool(pool).await
    }

    /// Bring your own pool.
    pub async fn with_pool(self, pool: PgPool) -> Result<Storage, Error> {
        Storage::new(ConnectionSource::Pool(pool), self.opts).await
    }

    /// Open a new connection for every operation and close it right after.
    pub async fn with_connect_options(self, opts: PgConnectOptions) -> Result<Storage, Error> {
        Storage::new(ConnectionSource::Dedicated(opts), self.opts).await
    }

    /// Run every operation on this connection.
    ///
    /// The connection stays yours: it is locked for the duration of each operation
    /// and never closed by the storage.
    pub async fn with_shared_connection(
        self,
        conn: Arc<Mutex<PgConnection>>,
    ) -> Result<Storage, Error> {
        Storage::new(ConnectionSource::External(conn), self.opts).await
    }
}
