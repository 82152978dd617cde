use crate::IsolationLevel;
use std::time::Duration;

pub(crate) const DEFAULT_SCHEMA: &str = "pgjobstore";

#[derive(Debug, Clone)]
pub(crate) struct StorageOptions {
    pub(crate) schema: String,
    pub(crate) prepare_schema: bool,
    pub(crate) queues: Option<Vec<String>>,

    pub(crate) invisibility_timeout: Duration,
    pub(crate) fetch_next_job_timeout: Duration,
    pub(crate) queue_poll_interval: Duration,
    pub(crate) job_expiration_check_interval: Duration,
    pub(crate) counters_aggregate_interval: Duration,

    pub(crate) isolation_level: IsolationLevel,
    pub(crate) transaction_conflict_retries: usize,
    pub(crate) delete_batch_size: usize,
    pub(crate) aggregate_batch_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            schema: DEFAULT_SCHEMA.to_string(),
            prepare_schema: true,
            queues: None,
            invisibility_timeout: Duration::from_secs(30 * 60),
            fetch_next_job_timeout: Duration::from_secs(30),
            queue_poll_interval: Duration::from_secs(1),
            job_expiration_check_interval: Duration::from_secs(60 * 60),
            counters_aggregate_interval: Duration::from_secs(5 * 60),
            isolation_level: IsolationLevel::ReadCommitted,
            transaction_conflict_retries: 3,
            delete_batch_size: 1000,
            aggregate_batch_size: 1000,
        }
    }
}
