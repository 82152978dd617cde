use std::sync::Arc;

use crate::connection::{ConnectionManager, ConnectionSource};
use crate::queue::{FetchOptions, JobQueue, QueueProvider, QueueProviderRegistry};
use crate::stmt::Statements;
use crate::{sql, App, Error, MonitoringApi};

mod builder;
mod opts;
mod public;

pub use builder::StorageBuilder;

/// Job storage backed by PostgreSQL.
///
/// Cheap to clone: clones share the connection source and the registry.
#[derive(Debug, Clone)]
pub struct Storage {
    manager: ConnectionManager,
    stmt: Arc<Statements>,
    registry: Arc<QueueProviderRegistry>,
    monitoring: MonitoringApi,
    opts: Arc<opts::StorageOptions>,
}

impl Storage {
    async fn new(source: ConnectionSource, opts: opts::StorageOptions) -> Result<Self, Error> {
        let manager = ConnectionManager::new(source, opts.isolation_level);
        let stmt = Arc::new(Statements::for_schema(&opts.schema));
        let monitoring = MonitoringApi::new(manager.clone(), Arc::clone(&stmt));
        let job_queue = JobQueue::new(
            manager.clone(),
            Arc::clone(&stmt),
            FetchOptions {
                invisibility_timeout: opts.invisibility_timeout,
                poll_interval: opts.queue_poll_interval,
                conflict_retries: opts.transaction_conflict_retries,
            },
        );
        let provider = QueueProvider::Relational {
            job_queue,
            monitoring: monitoring.clone(),
        };
        let registry = match &opts.queues {
            Some(queue_names) => {
                let mut registry = QueueProviderRegistry::default();
                registry.add(provider, queue_names.iter().cloned());
                registry
            }
            None => QueueProviderRegistry::with_default(provider),
        };
        let s = Storage {
            manager,
            stmt,
            registry: Arc::new(registry),
            monitoring,
            opts: Arc::new(opts),
        };
        if s.opts.prepare_schema {
            s.init().await?;
        }
        Ok(s)
    }

    async fn init(&self) -> Result<(), Error> {
        if let Some(app) = self.maybe_existing_app().await? {
            tracing::info!(
                schema = %self.opts.schema,
                version = app.version,
                installed_on = %app.installed_on,
                "schema already installed"
            );
            if app.version < crate::MINIMUM_SUPPORTED_SCHEMA_VERSION as i32 {
                return Err(Error::Unprocessable {
                    msg: "installed schema version is not supported",
                });
            }
            return Ok(());
        }
        self.install_app().await
    }

    async fn install_app(&self) -> Result<(), Error> {
        let ddl = sql::install_app(&self.opts.schema);
        self.manager
            .with_connection(move |conn| {
                Box::pin(async move {
                    sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&ddl)).await?;
                    Ok(())
                })
            })
            .await?;
        tracing::info!(schema = %self.opts.schema, "installed schema");
        Ok(())
    }

    async fn maybe_existing_app(&self) -> Result<Option<App>, Error> {
        let schema = self.opts.schema.clone();
        self.manager
            .with_connection(move |conn| {
                Box::pin(async move {
                    let stmt = sql::dml::check_if_app_installed(&schema);
                    let installed: bool = sqlx::query_scalar(&stmt).fetch_one(&mut *conn).await?;
                    if !installed {
                        return Ok(None);
                    }
                    let stmt = sql::dml::get_app(&schema);
                    let app: Option<App> = sqlx::query_as(&stmt).fetch_optional(&mut *conn).await?;
                    Ok(app)
                })
            })
            .await
    }
}
