use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Error;

mod counters;
mod expiration;

pub use counters::CountersAggregator;
pub use expiration::ExpirationManager;

/// Recurring housekeeping task run by the host alongside the workers.
#[async_trait]
pub trait MaintenanceComponent: Send + Sync + std::fmt::Debug {
    /// Name to refer to this component by in logs.
    fn name(&self) -> &'static str;

    /// Pause between two passes.
    fn interval(&self) -> Duration;

    /// Perform one housekeeping pass.
    ///
    /// Returns the number of records affected. Each batch is committed on its own,
    /// and `cancel` is only checked between batches.
    async fn run_once(&self, cancel: &CancellationToken) -> Result<u64, Error>;

    /// Run passes every [`MaintenanceComponent::interval`] until `cancel` fires.
    ///
    /// A failed pass is logged and the next one runs on schedule as usual.
    async fn execute(&self, cancel: CancellationToken) {
        tracing::info!(component = self.name(), interval = ?self.interval(), "starting");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval()) => {}
            }
            match self.run_once(&cancel).await {
                Ok(0) => tracing::debug!(component = self.name(), "nothing to do"),
                Ok(affected) => tracing::info!(component = self.name(), affected, "pass completed"),
                Err(e) => tracing::warn!(component = self.name(), error = %e, "pass failed"),
            }
        }
        tracing::info!(component = self.name(), "stopped");
    }
}
