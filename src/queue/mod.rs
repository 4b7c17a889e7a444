//! Ordered view over the record store
//!
//! Index assignment reads the current maximum and writes above it without any
//! reservation step. Two processes enqueueing into the same queue at the same
//! moment can compute the same indices, and the later write replaces the
//! earlier record.

pub mod pool_config;

pub use pool_config::PoolConfig;

use crate::core::errors::Result;
use crate::storage::{QueueRecord, RecordIndex, RecordStore};
use std::sync::Arc;
use tracing::{debug, info};

/// A named queue of pending shell commands
#[derive(Clone)]
pub struct Queue {
    name: String,
    store: Arc<dyn RecordStore>,
}

impl Queue {
    pub fn new(name: impl Into<String>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Append commands, numbered consecutively after the current maximum index.
    ///
    /// Returns the assigned indices in input order.
    pub async fn enqueue<S: AsRef<str>>(&self, commands: &[S]) -> Result<Vec<RecordIndex>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let next = match self.list().await?.last() {
            Some(max) => max + 1,
            None => 0,
        };

        let mut assigned = Vec::with_capacity(commands.len());
        for (offset, command) in commands.iter().enumerate() {
            let record = QueueRecord {
                index: next + offset as RecordIndex,
                content: command.as_ref().to_string(),
            };
            self.store.write_pending(&record).await?;
            assigned.push(record.index);
        }

        info!(queue = %self.name, "Enqueued {} commands.", commands.len());
        debug!(queue = %self.name, indices = ?assigned, "Enqueued indices");
        Ok(assigned)
    }

    /// Pending indices in ascending numeric order. Empty when nothing is pending.
    pub async fn list(&self) -> Result<Vec<RecordIndex>> {
        let mut indices = self.store.pending_indices().await?;
        indices.sort_unstable();
        Ok(indices)
    }

    /// Content of a pending record
    pub async fn read(&self, index: RecordIndex) -> Result<Option<String>> {
        self.store.read_pending(index).await
    }

    /// Remove records by index. Absent records are skipped.
    ///
    /// Returns how many records were actually removed.
    pub async fn dequeue(&self, indices: &[RecordIndex]) -> Result<usize> {
        let mut removed = 0;
        for &index in indices {
            if self.store.remove_pending(index).await? {
                removed += 1;
            } else {
                debug!(queue = %self.name, index, "Record already dequeued");
            }
        }
        if !indices.is_empty() {
            info!(queue = %self.name, "Dequeued {} commands.", removed);
        }
        Ok(removed)
    }
}
