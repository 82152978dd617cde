use super::Storage;
use crate::Error;
use sqlx::postgres::PgPool;

#[cfg(doc)]
use crate::StorageBuilder;

impl Storage {
    /// Create new [`Storage`] and connect to a PostgreSQL server.
    ///
    /// If `url` is not given, `POSTGRES_PROVIDER` is read to get the name of the environment variable
    /// to get the address from (defaults to `POSTGRES_URL`), and then that environment variable is read
    /// to get the server address. If the latter environment variable is not defined, the connection will be
    /// made to `postgres://localhost:5432`.
    ///
    /// You can optionally use [`Storage::connect_to`] and pass the `url` as an argument.
    pub async fn connect() -> Result<Storage, Error> {
        Storage::builder().connect().await
    }

    /// Connect to the PostgreSQL server using specific url.
    ///
    /// To configure `ssl` (e.g. `sslmode=require`), you will need to build
    /// your own `Pool` and use [`StorageBuilder::with_pool`] method instead.
    pub async fn connect_to<U>(url: U) -> Result<Storage, Error>
    where
        U: AsRef<str>,
    {
        Storage::builder().connect_to(url).await
    }

    /// Bring your own pool.
    pub async fn with_pool(pool: PgPool) -> Result<Self, Error> {
        Storage::builder().with_pool(pool).await
    }
}
