//! # dirqueue: durable shell command queue
//!
//! Commands are enqueued as files in a per-queue directory. A dispatcher polls
//! that directory, takes everything pending as one batch, runs the batch with a
//! bounded number of concurrent workers and writes one completion record per
//! attempt. The concurrency is stored next to the queue and read again on every
//! tick, so it can be changed while the dispatcher runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dirqueue::{ExecutorConfig, QueueExecutorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> dirqueue::Result<()> {
//!     let executor = QueueExecutorBuilder::new("my_queue")
//!         .with_config(ExecutorConfig::default())
//!         .with_pool_size(2)
//!         .build()
//!         .await?;
//!
//!     executor.enqueue(&["python3 -m src.my_script"]).await?;
//!     executor.run().await
//! }
//! ```
//!
//! ## Delivery
//!
//! Execution is at-least-once. A pending record is removed only after its
//! command finished and its completion record was written, so a dispatcher
//! killed mid-batch runs the interrupted commands again after a restart. Index
//! assignment on enqueue is not reserved atomically; concurrent enqueuers into
//! one queue can overwrite each other's records. One dispatcher per queue.

pub mod config;
pub mod core;
pub mod executor;
pub mod logging;
pub mod queue;
pub mod storage;

// Re-exports for convenience
pub use crate::config::{ExecutorConfig, ExecutorConfigBuilder, LogConfig};
pub use crate::core::errors::{QueueError, Result};
pub use executor::{
    BatchReport, CommandRunner, Dispatcher, DispatcherState, Execution, ShellRunner, TickOutcome,
    WorkerPool,
};
pub use queue::{PoolConfig, Queue};
pub use storage::{
    CompletionRecord, FsRecordStore, InFlightSnapshot, QueueLayout, QueueRecord, RecordIndex,
    RecordStore,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Point-in-time view of a queue directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: Vec<RecordIndex>,
    pub pool_size: Option<usize>,
    pub in_flight: Option<InFlightSnapshot>,
    pub completed: usize,
}

/// A queue together with its pool configuration and the means to drain it
pub struct QueueExecutor {
    layout: QueueLayout,
    queue: Queue,
    pool_config: PoolConfig,
    runner: Arc<dyn CommandRunner>,
    idle_delay: Duration,
}

impl QueueExecutor {
    pub fn layout(&self) -> &QueueLayout {
        &self.layout
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    /// Append commands to the queue
    pub async fn enqueue<S: AsRef<str>>(&self, commands: &[S]) -> Result<Vec<RecordIndex>> {
        self.queue.enqueue(commands).await
    }

    /// Change the concurrency used from the next tick on
    pub async fn set_pool_size(&self, size: usize) -> Result<()> {
        self.pool_config.set(size).await
    }

    /// A dispatcher for this queue; drive it with `tick` or `run`
    pub fn dispatcher(&self) -> Dispatcher {
        let workers = WorkerPool::new(self.queue.clone(), self.runner.clone());
        Dispatcher::new(self.queue.clone(), self.pool_config.clone(), workers)
            .with_idle_delay(self.idle_delay)
    }

    /// Run the dispatcher loop until a fatal error
    pub async fn run(&self) -> Result<()> {
        self.dispatcher().run().await
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        let store = self.queue.store();
        Ok(QueueStatus {
            pending: self.queue.list().await?,
            pool_size: store.read_pool_size().await?.map(|p| p.size),
            in_flight: store.read_in_flight().await?,
            completed: store.completions().await?.len(),
        })
    }
}

/// Builder for QueueExecutor
pub struct QueueExecutorBuilder {
    name: String,
    config: Option<ExecutorConfig>,
    pool_size: Option<usize>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl QueueExecutorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
            pool_size: None,
            runner: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Store this pool size when building
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Replace the shell runner built from the configuration
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub async fn build(self) -> Result<QueueExecutor> {
        validate_queue_name(&self.name)?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let layout = QueueLayout::named(config.queues_path(), &self.name);
        let store: Arc<dyn RecordStore> = Arc::new(FsRecordStore::new(layout.clone()));
        let queue = Queue::new(self.name.clone(), store.clone());
        let pool_config = PoolConfig::new(store);

        if let Some(size) = self.pool_size {
            pool_config.set(size).await?;
        }

        let runner = match self.runner {
            Some(runner) => runner,
            None => {
                let mut shell = ShellRunner::new(config.shell.clone());
                if let Some(dir) = &config.workdir {
                    shell = shell.with_workdir(dir);
                }
                Arc::new(shell)
            }
        };

        info!(queue = %self.name, root = %layout.root().display(), "Queue opened");
        Ok(QueueExecutor {
            layout,
            queue,
            pool_config,
            runner,
            idle_delay: config.idle_delay(),
        })
    }
}

/// Queue names become a single directory component
fn validate_queue_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(QueueError::configuration_field(
            format!("invalid queue name: {:?}", name),
            "queue",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ExecutorConfig {
        ExecutorConfig::builder()
            .root(dir.path())
            .idle_delay(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_queue_name_validation() {
        assert!(validate_queue_name("nightly_jobs").is_ok());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("..").is_err());
        assert!(validate_queue_name("a/b").is_err());
        assert!(validate_queue_name("a\nb").is_err());
    }

    #[tokio::test]
    async fn test_build_lays_out_queue_under_root() {
        let dir = TempDir::new().unwrap();
        let executor = QueueExecutorBuilder::new("my_queue")
            .with_config(config(&dir))
            .with_pool_size(2)
            .build()
            .await
            .unwrap();

        assert_eq!(
            executor.layout().root(),
            dir.path().join("queues").join("my_queue")
        );
        assert!(executor.layout().pool_size_path().exists());
        assert_eq!(executor.pool_config().get().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_status_reflects_queue() {
        let dir = TempDir::new().unwrap();
        let executor = QueueExecutorBuilder::new("q")
            .with_config(config(&dir))
            .build()
            .await
            .unwrap();
        executor.enqueue(&["true", "true"]).await.unwrap();

        let status = executor.status().await.unwrap();
        assert_eq!(
            status,
            QueueStatus {
                pending: vec![0, 1],
                pool_size: None,
                in_flight: None,
                completed: 0,
            }
        );

        executor.set_pool_size(1).await.unwrap();
        executor.dispatcher().tick().await.unwrap();

        let status = executor.status().await.unwrap();
        assert!(status.pending.is_empty());
        assert_eq!(status.pool_size, Some(1));
        assert_eq!(status.completed, 2);
        assert_eq!(status.in_flight.map(|s| s.len()), Some(2));
    }
}
