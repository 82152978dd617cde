use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, Postgres};
use sqlx::Connection;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::Error;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsolationLevel {
    /// Read uncommitted.
    ///
    /// PostgreSQL treats it as [`IsolationLevel::ReadCommitted`].
    ReadUncommitted,

    /// Read committed (default).
    #[default]
    ReadCommitted,

    /// Repeatable read.
    RepeatableRead,

    /// Serializable.
    Serializable,
}

impl IsolationLevel {
    fn set_transaction(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ReadUncommitted => "read uncommitted",
            Self::ReadCommitted => "read committed",
            Self::RepeatableRead => "repeatable read",
            Self::Serializable => "serializable",
        };
        write!(f, "{}", s)
    }
}

/// Where connections come from.
#[derive(Debug, Clone)]
pub(crate) enum ConnectionSource {
    /// Internally owned pool, a connection is checked out per operation.
    Pool(PgPool),

    /// A fresh connection is opened per operation and closed afterwards.
    Dedicated(PgConnectOptions),

    /// Connection owned by the caller, shared by every operation and never closed here.
    External(Arc<Mutex<PgConnection>>),
}

enum Handle {
    Pooled(PoolConnection<Postgres>),
    Dedicated(PgConnection),
    External(OwnedMutexGuard<PgConnection>),
}

/// Connection checked out for exactly one caller.
///
/// Dropping the guard releases the connection: a pooled one goes back to the pool,
/// a dedicated one gets disconnected, and an external one is merely unlocked.
/// Use [`StorageConnection::release`] to close a dedicated connection gracefully.
pub struct StorageConnection {
    handle: Handle,
}

impl std::fmt::Debug for StorageConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.handle {
            Handle::Pooled(_) => "pooled",
            Handle::Dedicated(_) => "dedicated",
            Handle::External(_) => "external",
        };
        f.debug_struct("StorageConnection")
            .field("kind", &kind)
            .finish()
    }
}

impl StorageConnection {
    /// Whether this connection is caller-owned, i.e. will never be closed by this crate.
    pub fn is_external(&self) -> bool {
        matches!(self.handle, Handle::External(_))
    }

    /// Release the connection.
    pub async fn release(self) -> Result<(), Error> {
        match self.handle {
            Handle::Dedicated(conn) => Ok(conn.close().await?),
            Handle::Pooled(_) | Handle::External(_) => Ok(()),
        }
    }
}

impl Deref for StorageConnection {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        match &self.handle {
            Handle::Pooled(conn) => &**conn,
            Handle::Dedicated(conn) => conn,
            Handle::External(conn) => &**conn,
        }
    }
}

impl DerefMut for StorageConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.handle {
            Handle::Pooled(conn) => &mut **conn,
            Handle::Dedicated(conn) => conn,
            Handle::External(conn) => &mut **conn,
        }
    }
}

/// Every interaction with the store goes through here.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    source: ConnectionSource,
    isolation_level: IsolationLevel,
}

impl ConnectionManager {
    pub(crate) fn new(source: ConnectionSource, isolation_level: IsolationLevel) -> Self {
        ConnectionManager {
            source,
            isolation_level,
        }
    }

    /// Isolation level used by this storage unless a call asks for another one.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Check out a connection.
    ///
    /// The caller owns the returned guard and is responsible for releasing it.
    pub async fn acquire(&self) -> Result<StorageConnection, Error> {
        let handle = match &self.source {
            ConnectionSource::Pool(pool) => Handle::Pooled(pool.acquire().await?),
            ConnectionSource::Dedicated(opts) => {
                Handle::Dedicated(PgConnection::connect_with(opts).await?)
            }
            ConnectionSource::External(conn) => Handle::External(conn.clone().lock_owned().await),
        };
        Ok(StorageConnection { handle })
    }

    /// Run `f` with a connection, releasing it whatever the outcome.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, Error>>,
    {
        let mut conn = self.acquire().await?;
        let result = f(&mut *conn).await;
        finish(conn, result).await
    }

    /// Run `f` in a transaction at the storage's default isolation level.
    ///
    /// See [`ConnectionManager::with_transaction_at`].
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, Error>>,
    {
        self.with_transaction_at(self.isolation_level, f).await
    }

    /// Run `f` in a transaction at the given isolation level.
    ///
    /// Commits if `f` succeeds and rolls back otherwise. If the returned future is
    /// dropped midway, the transaction is rolled back and the connection released
    /// all the same.
    pub async fn with_transaction_at<F, T>(&self, isolation: IsolationLevel, f: F) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, Error>>,
    {
        let conn = self.acquire().await?;
        self.with_transaction_on(conn, isolation, f).await
    }

    /// Like [`ConnectionManager::with_transaction_at`], but on a connection checked
    /// out beforehand with [`ConnectionManager::acquire`].
    ///
    /// The connection is released once done, whatever the outcome.
    pub async fn with_transaction_on<F, T>(
        &self,
        mut conn: StorageConnection,
        isolation: IsolationLevel,
        f: F,
    ) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, Error>>,
    {
        let result = transact(&mut *conn, isolation, f).await;
        finish(conn, result).await
    }

    /// Like [`ConnectionManager::with_transaction_at`], but re-runs `f` from scratch
    /// as long as it fails with [`Error::TransactionConflict`], at most `attempts` times.
    pub async fn with_transaction_retried<F, T>(
        &self,
        isolation: IsolationLevel,
        attempts: usize,
        f: F,
    ) -> Result<T, Error>
    where
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, Result<T, Error>>,
    {
        let mut attempt = 1;
        loop {
            match self.with_transaction_at(isolation, |conn| f(conn)).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::debug!(attempt, error = %e, "retrying conflicting transaction");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

async fn transact<F, T>(conn: &mut PgConnection, isolation: IsolationLevel, f: F) -> Result<T, Error>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, Error>>,
{
    let mut tx = conn.begin().await?;
    sqlx::query(isolation.set_transaction())
        .execute(&mut *tx)
        .await?;
    // if this future gets dropped, the transaction is rolled back on the connection's next use
    let result = f(&mut *tx).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            // release row locks right away rather than when the connection is reused
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(error = %rollback_error, "failed to roll back transaction");
            }
            Err(e)
        }
    }
}

async fn finish<T>(conn: StorageConnection, result: Result<T, Error>) -> Result<T, Error> {
    match (result, conn.release().await) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), released) => {
            if let Err(release_error) = released {
                tracing::warn!(error = %release_error, "failed to release connection");
            }
            Err(e)
        }
    }
}
