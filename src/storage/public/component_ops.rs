use super::Storage;
use crate::maintenance::{CountersAggregator, ExpirationManager, MaintenanceComponent};
use crate::{ConnectionManager, Error, MonitoringApi, QueueProvider, StorageConnection};
use std::sync::Arc;

impl Storage {
    /// Check out a connection to the store.
    ///
    /// Release it when done, see [`StorageConnection`].
    pub async fn get_connection(&self) -> Result<StorageConnection, Error> {
        self.manager.acquire().await
    }

    /// Connection and transaction management used by this storage.
    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Read-only view on this storage.
    pub fn monitoring_api(&self) -> &MonitoringApi {
        &self.monitoring
    }

    /// Provider serving the queue with this name.
    pub fn queue_provider<Q>(&self, queue_name: Q) -> Result<&QueueProvider, Error>
    where
        Q: AsRef<str>,
    {
        self.registry.get(queue_name.as_ref())
    }

    /// Expiration manager for this storage.
    pub fn expiration_manager(&self) -> ExpirationManager {
        ExpirationManager::new(
            self.manager.clone(),
            Arc::clone(&self.stmt),
            self.opts.job_expiration_check_interval,
            self.opts.delete_batch_size,
            self.opts.transaction_conflict_retries,
        )
    }

    /// Counters aggregator for this storage.
    pub fn counters_aggregator(&self) -> CountersAggregator {
        CountersAggregator::new(
            self.manager.clone(),
            Arc::clone(&self.stmt),
            self.opts.counters_aggregate_interval,
            self.opts.aggregate_batch_size,
            self.opts.transaction_conflict_retries,
        )
    }

    /// Housekeeping components the host should keep running.
    ///
    /// Each one is meant to be started once with [`MaintenanceComponent::execute`],
    /// on its own task.
    pub fn components(&self) -> Vec<Box<dyn MaintenanceComponent>> {
        let expiration: Box<dyn MaintenanceComponent> = Box::new(self.expiration_manager());
        let aggregation: Box<dyn MaintenanceComponent> = Box::new(self.counters_aggregator());
        vec![expiration, aggregation]
    }
}
