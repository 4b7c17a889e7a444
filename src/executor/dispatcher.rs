use super::worker_pool::{BatchReport, WorkerPool};
use crate::core::errors::Result;
use crate::queue::{PoolConfig, Queue};
use crate::storage::{InFlightSnapshot, QueueRecord};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default pause between ticks
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Nothing pending at the last look
    Idle,
    /// A batch is with the worker pool
    Draining,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty, nothing dispatched
    Idle,
    /// A batch was run to completion
    Drained {
        report: BatchReport,
        /// Pending records left after the batch, enqueued while it ran
        remaining: usize,
    },
}

/// Polling control loop for one queue.
///
/// Assumes it is the only dispatcher for its queue directory. A second one
/// would pick up the same records and run them twice.
pub struct Dispatcher {
    queue: Queue,
    pool_config: PoolConfig,
    workers: WorkerPool,
    idle_delay: Duration,
    state: DispatcherState,
}

impl Dispatcher {
    pub fn new(queue: Queue, pool_config: PoolConfig, workers: WorkerPool) -> Self {
        Self {
            queue,
            pool_config,
            workers,
            idle_delay: DEFAULT_IDLE_DELAY,
            state: DispatcherState::Idle,
        }
    }

    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Poll forever. Only returns when a tick fails with a fatal error; other
    /// tick errors are logged and the next tick retries.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting Queue: {}", self.queue.name());
        loop {
            match self.tick().await {
                Ok(_) => {}
                Err(e) if !e.is_fatal() => {
                    warn!(queue = %self.queue.name(), category = e.category(), "Tick failed: {}", e);
                }
                Err(e) => {
                    error!(queue = %self.queue.name(), category = e.category(), "Dispatcher stopped: {}", e);
                    return Err(e);
                }
            }
            tokio::time::sleep(self.idle_delay).await;
        }
    }

    /// One poll cycle: snapshot pending records, run them all, report.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        debug!("Refreshing queue.");
        let indices = self.queue.list().await?;
        if indices.is_empty() {
            self.state = DispatcherState::Idle;
            return Ok(TickOutcome::Idle);
        }

        let mut records = Vec::with_capacity(indices.len());
        for index in indices {
            match self.queue.read(index).await? {
                Some(content) => records.push(QueueRecord { index, content }),
                None => debug!(index, "Record vanished before dispatch"),
            }
        }
        if records.is_empty() {
            self.state = DispatcherState::Idle;
            return Ok(TickOutcome::Idle);
        }

        let snapshot = InFlightSnapshot::from_records(&records);
        if let Err(e) = self.queue.store().write_in_flight(&snapshot).await {
            warn!(error = %e, "Could not publish in-flight snapshot");
        }

        let concurrency = self.pool_config.get().await?;

        self.state = DispatcherState::Draining;
        info!("Pooling {} commands.", records.len());
        debug!(concurrency, commands = ?snapshot.commands, "Pooling commands");

        let batch: BTreeMap<_, _> = records
            .into_iter()
            .map(|record| (record.index, record.content))
            .collect();
        let report = self.workers.execute(batch, concurrency).await?;
        self.state = DispatcherState::Idle;

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            unsettled = report.unsettled,
            "Batch finished"
        );

        let remaining = self.queue.list().await?.len();
        if remaining == 0 {
            info!("Queue is Empty. Enqueue more commands to execute..");
        }

        Ok(TickOutcome::Drained { report, remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::runner::ShellRunner;
    use crate::storage::{
        CompletionRecord, FsRecordStore, PoolSize, QueueLayout, RecordIndex, RecordStore,
    };
    use crate::QueueError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn dispatcher(dir: &TempDir) -> (Queue, PoolConfig, Dispatcher) {
        let store = Arc::new(FsRecordStore::new(QueueLayout::named(dir.path(), "q")));
        let queue = Queue::new("q", store.clone());
        let pool = PoolConfig::new(store);
        let workers = WorkerPool::new(queue.clone(), Arc::new(ShellRunner::default()));
        let dispatcher = Dispatcher::new(queue.clone(), pool.clone(), workers)
            .with_idle_delay(Duration::from_millis(10));
        (queue, pool, dispatcher)
    }

    #[tokio::test]
    async fn test_empty_queue_ticks_idle() {
        let dir = TempDir::new().unwrap();
        let (_queue, _pool, mut dispatcher) = dispatcher(&dir);
        assert_eq!(dispatcher.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn test_missing_pool_size_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (queue, _pool, mut dispatcher) = dispatcher(&dir);
        queue.enqueue(&["true"]).await.unwrap();

        let err = dispatcher.tick().await.unwrap_err();
        assert!(matches!(err, QueueError::ConfigMissing { .. }));
        assert!(err.is_fatal());
        // nothing ran
        assert_eq!(queue.list().await.unwrap(), vec![0]);

        assert!(matches!(
            dispatcher.run().await,
            Err(QueueError::ConfigMissing { .. })
        ));
    }

    /// Fails the first listing with a non-fatal error, then delegates
    struct FlakyStore {
        inner: FsRecordStore,
        listings: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn pending_indices(&self) -> Result<Vec<RecordIndex>> {
            if self.listings.fetch_add(1, Ordering::SeqCst) == 0 {
                let io = std::io::Error::new(std::io::ErrorKind::Interrupted, "flaky");
                return Err(QueueError::launch("ls", io));
            }
            self.inner.pending_indices().await
        }

        async fn read_pending(&self, index: RecordIndex) -> Result<Option<String>> {
            self.inner.read_pending(index).await
        }

        async fn write_pending(&self, record: &QueueRecord) -> Result<()> {
            self.inner.write_pending(record).await
        }

        async fn remove_pending(&self, index: RecordIndex) -> Result<bool> {
            self.inner.remove_pending(index).await
        }

        async fn write_completion(&self, record: &CompletionRecord) -> Result<PathBuf> {
            self.inner.write_completion(record).await
        }

        async fn completions(&self) -> Result<Vec<CompletionRecord>> {
            self.inner.completions().await
        }

        async fn read_pool_size(&self) -> Result<Option<PoolSize>> {
            self.inner.read_pool_size().await
        }

        async fn write_pool_size(&self, size: PoolSize) -> Result<()> {
            self.inner.write_pool_size(size).await
        }

        async fn read_in_flight(&self) -> Result<Option<InFlightSnapshot>> {
            self.inner.read_in_flight().await
        }

        async fn write_in_flight(&self, snapshot: &InFlightSnapshot) -> Result<()> {
            self.inner.write_in_flight(snapshot).await
        }

        fn pool_size_path(&self) -> PathBuf {
            self.inner.pool_size_path()
        }
    }

    #[tokio::test]
    async fn test_run_survives_non_fatal_tick_error() {
        let dir = TempDir::new().unwrap();
        let inner = FsRecordStore::new(QueueLayout::named(dir.path(), "q"));
        Queue::new("q", Arc::new(inner.clone()))
            .enqueue(&["true"])
            .await
            .unwrap();

        let store = Arc::new(FlakyStore {
            inner,
            listings: AtomicUsize::new(0),
        });
        let queue = Queue::new("q", store.clone());
        let workers = WorkerPool::new(queue.clone(), Arc::new(ShellRunner::default()));
        let mut dispatcher = Dispatcher::new(queue.clone(), PoolConfig::new(store.clone()), workers)
            .with_idle_delay(Duration::from_millis(10));

        // second tick reaches the missing pool size, which stops the loop
        let err = dispatcher.run().await.unwrap_err();
        assert!(matches!(err, QueueError::ConfigMissing { .. }));
        assert_eq!(store.listings.load(Ordering::SeqCst), 2);
        assert_eq!(queue.list().await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_tick_publishes_snapshot() {
        let dir = TempDir::new().unwrap();
        let (queue, pool, mut dispatcher) = dispatcher(&dir);
        pool.set(2).await.unwrap();
        queue.enqueue(&["echo one", "echo two"]).await.unwrap();

        dispatcher.tick().await.unwrap();

        let snapshot = queue.store().read_in_flight().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.commands.get(&1).map(String::as_str), Some("echo two"));
    }
}
