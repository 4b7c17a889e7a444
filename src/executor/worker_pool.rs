use super::runner::{run_one, CommandRunner};
use crate::core::errors::{QueueError, Result};
use crate::queue::Queue;
use crate::storage::RecordIndex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Tally of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Concurrency the batch ran with
    pub concurrency: usize,
    /// Commands the runner returned for
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Attempts whose pending record may still exist: the dequeue failed or the
    /// worker panicked. These run again on a later tick.
    pub unsettled: usize,
}

/// Fans a batch out over at most `concurrency` workers
#[derive(Clone)]
pub struct WorkerPool {
    queue: Queue,
    runner: Arc<dyn CommandRunner>,
}

impl WorkerPool {
    pub fn new(queue: Queue, runner: Arc<dyn CommandRunner>) -> Self {
        Self { queue, runner }
    }

    /// Run every command in `batch` once and wait for all of them.
    ///
    /// Work is handed out in ascending index order as permits free up; the
    /// commands themselves finish in any order. Failed commands are not retried.
    ///
    /// Dropping the returned future aborts every worker still running, so an
    /// interrupted batch leaves its unfinished records pending.
    pub async fn execute(
        &self,
        batch: BTreeMap<RecordIndex, String>,
        concurrency: usize,
    ) -> Result<BatchReport> {
        let concurrency = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut workers = JoinSet::new();

        for (index, command) in batch {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| QueueError::internal(format!("worker semaphore closed: {}", e)))?;

            let queue = self.queue.clone();
            let runner = self.runner.clone();
            debug!(index, active = concurrency - semaphore.available_permits(), "Starting worker");

            workers.spawn(async move {
                let result = run_one(index, command, runner.as_ref(), &queue).await;
                drop(permit);
                (index, result)
            });
        }

        let mut report = BatchReport {
            concurrency,
            ..Default::default()
        };
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(record))) => {
                    report.attempted += 1;
                    if record.status {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Ok((index, Err(e))) => {
                    error!(index, error = %e, "Command ran but could not be dequeued");
                    report.attempted += 1;
                    report.failed += 1;
                    report.unsettled += 1;
                }
                Err(e) => {
                    error!(error = %e, "Worker task did not finish");
                    report.unsettled += 1;
                }
            }
        }

        Ok(report)
    }
}
