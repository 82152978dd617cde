use sqlx::{postgres::PgPoolOptions, PgPool};

/// Address of the PostgreSQL server to connect to when none is given explicitly.
///
/// `POSTGRES_PROVIDER` names the environment variable holding the url (defaults to
/// `POSTGRES_URL`), falling back to `postgres://localhost:5432`.
pub(crate) fn default_url() -> String {
    let var_name =
        std::env::var("POSTGRES_PROVIDER").unwrap_or_else(|_| "POSTGRES_URL".to_string());
    std::env::var(var_name).unwrap_or_else(|_| "postgres://localhost:5432".to_string())
}

pub(crate) async fn create_pool(url: Option<&str>) -> Result<PgPool, sqlx::Error> {
    let pool = match url {
        Some(url) => {
            PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?
        }
        None => {
            PgPoolOptions::new()
                .max_connections(10)
                .connect(&default_url())
                .await?
        }
    };
    Ok(pool)
}
