use crate::core::errors::{QueueError, Result};
use crate::storage::{PoolSize, RecordStore};
use std::sync::Arc;
use tracing::info;

/// Desired worker concurrency for a queue.
///
/// Not cached: every `get` goes back to the store, so a resize from another
/// process is picked up by the dispatcher on its next tick.
#[derive(Clone)]
pub struct PoolConfig {
    store: Arc<dyn RecordStore>,
}

impl PoolConfig {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn set(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(QueueError::configuration_field(
                "pool size must be at least 1",
                "size",
            ));
        }
        self.store.write_pool_size(PoolSize { size }).await?;
        info!(size, "Pool size set");
        Ok(())
    }

    pub async fn get(&self) -> Result<usize> {
        match self.store.read_pool_size().await? {
            Some(PoolSize { size }) if size > 0 => Ok(size),
            Some(_) => Err(QueueError::configuration_field(
                format!(
                    "stored pool size in {} must be at least 1",
                    self.store.pool_size_path().display()
                ),
                "size",
            )),
            None => Err(QueueError::config_missing(self.store.pool_size_path())),
        }
    }
}
