mod component_ops;
mod connect_ops;
mod job_ops;
use super::{builder::StorageBuilder, Storage};

impl Storage {
    /// Create an instance of [`StorageBuilder`]
    pub fn builder() -> StorageBuilder {
        StorageBuilder::default()
    }
}
