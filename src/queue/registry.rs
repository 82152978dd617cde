use std::collections::HashMap;

use super::JobQueue;
use crate::{Error, MonitoringApi};

/// Backend responsible for a set of queues.
///
/// Only the relational backend exists for now.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum QueueProvider {
    /// Queues kept in the `job_queue` table of the store.
    Relational {
        /// Fetch protocol.
        job_queue: JobQueue,
        /// Read-only view on the same queues.
        monitoring: MonitoringApi,
    },
}

impl QueueProvider {
    /// Job queue of this provider.
    pub fn job_queue(&self) -> &JobQueue {
        match self {
            Self::Relational { job_queue, .. } => job_queue,
        }
    }

    /// Monitoring API of this provider.
    pub fn monitoring_api(&self) -> &MonitoringApi {
        match self {
            Self::Relational { monitoring, .. } => monitoring,
        }
    }
}

/// Maps queue names to the provider serving them.
#[derive(Debug, Clone, Default)]
pub struct QueueProviderRegistry {
    default: Option<QueueProvider>,
    providers: HashMap<String, QueueProvider>,
}

impl QueueProviderRegistry {
    /// Registry serving every queue name with `provider`, unless told otherwise.
    pub fn with_default(provider: QueueProvider) -> Self {
        QueueProviderRegistry {
            default: Some(provider),
            providers: HashMap::new(),
        }
    }

    /// Serve these queues with `provider`, overriding any earlier registration.
    pub fn add<I, Q>(&mut self, provider: QueueProvider, queue_names: I)
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        for name in queue_names {
            self.providers.insert(name.into(), provider.clone());
        }
    }

    /// Provider serving `queue_name`.
    pub fn get(&self, queue_name: &str) -> Result<&QueueProvider, Error> {
        self.providers
            .get(queue_name)
            .or(self.default.as_ref())
            .ok_or_else(|| Error::UnknownQueue {
                name: queue_name.to_string(),
            })
    }

    /// Provider to fetch from `queue_names` with.
    ///
    /// Every name has to be known. The provider of the first one is returned.
    pub fn resolve(&self, queue_names: &[String]) -> Result<&QueueProvider, Error> {
        let mut resolved = None;
        for name in queue_names {
            let provider = self.get(name)?;
            resolved.get_or_insert(provider);
        }
        resolved.ok_or(Error::Unprocessable {
            msg: "at least one queue name is required",
        })
    }
}
