//! Record store for queues
//!
//! Every queue lives in its own directory. Pending commands, completion records,
//! the pool size and the in-flight snapshot are individual files in that tree,
//! and the directory is the only shared state between a dispatcher and the
//! processes that enqueue work. Nothing here takes a lock.

pub mod fs_store;
pub mod model;

pub use fs_store::{FsRecordStore, QueueLayout};
pub use model::{CompletionRecord, InFlightSnapshot, PoolSize, QueueRecord, RecordIndex};

use crate::core::errors::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Storage trait for queue persistence
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Indices of all pending records, in no particular order
    async fn pending_indices(&self) -> Result<Vec<RecordIndex>>;

    /// Content of a pending record, `None` if it is gone
    async fn read_pending(&self, index: RecordIndex) -> Result<Option<String>>;

    /// Create or overwrite a pending record
    async fn write_pending(&self, record: &QueueRecord) -> Result<()>;

    /// Remove a pending record. Returns false if it was already absent.
    async fn remove_pending(&self, index: RecordIndex) -> Result<bool>;

    /// Persist a completion record, returning where it was written
    async fn write_completion(&self, record: &CompletionRecord) -> Result<PathBuf>;

    /// All completion records written so far, oldest first
    async fn completions(&self) -> Result<Vec<CompletionRecord>>;

    /// Stored pool size, `None` if never set
    async fn read_pool_size(&self) -> Result<Option<PoolSize>>;

    async fn write_pool_size(&self, size: PoolSize) -> Result<()>;

    /// Last published in-flight snapshot, `None` if none was written yet
    async fn read_in_flight(&self) -> Result<Option<InFlightSnapshot>>;

    async fn write_in_flight(&self, snapshot: &InFlightSnapshot) -> Result<()>;

    /// Location of the pool size record, used in error messages
    fn pool_size_path(&self) -> PathBuf;
}
