//! Dispatch and execution of queued commands
//!
//! The dispatcher drains the queue in batches; the worker pool runs a batch
//! with bounded concurrency; the runner executes one command and settles its
//! records. Execution is at-least-once: a record leaves the queue only after
//! its command finished, so a crash mid-batch re-runs whatever was in flight.

pub mod dispatcher;
pub mod runner;
pub mod worker_pool;

pub use dispatcher::{Dispatcher, DispatcherState, TickOutcome, DEFAULT_IDLE_DELAY};
pub use runner::{run_one, CommandRunner, Execution, ShellRunner};
pub use worker_pool::{BatchReport, WorkerPool};
