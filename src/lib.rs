//! Durable job storage on top of PostgreSQL.
//!
//! Many workers may poll the same queues concurrently: each pending job is claimed
//! by at most one of them at a time (`FOR UPDATE SKIP LOCKED`), and claims that
//! are not settled within the invisibility timeout expire, so that jobs of crashed
//! workers get delivered again. Two maintenance components keep the store compact:
//! the [`ExpirationManager`] and the [`CountersAggregator`].
mod app;
mod connection;
mod error;
mod job;
mod maintenance;
mod monitoring;
mod queue;
mod sql;
mod stmt;
mod storage;
mod utils;
mod write;

pub(crate) use app::App;
pub use connection::{ConnectionManager, IsolationLevel, StorageConnection};
pub use error::Error;
pub use job::{JobDetails, JobId, JobState};
pub use maintenance::{CountersAggregator, ExpirationManager, MaintenanceComponent};
pub use monitoring::{MonitoringApi, QueueStats};
pub use queue::{FetchedJob, JobQueue, QueueProvider, QueueProviderRegistry};
pub use storage::{Storage, StorageBuilder};
pub use tokio_util::sync::CancellationToken;
pub use write::WriteTransaction;

pub(crate) const MINIMUM_SUPPORTED_SCHEMA_VERSION: u8 = 1;
pub(crate) const CURRENT_SCHEMA_VERSION: u8 = 1;
