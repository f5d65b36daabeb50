//! Background workers consuming the task-event bus.
//!
//! Each [`TaskWorker`] owns one bus subscription and handles task events
//! independently of the others. [`WorkerSet`] runs every long-lived loop of
//! the process (these workers, the notifier, the email queue, the purger and
//! the stats reporter) behind a panic barrier.

pub mod audit;
pub mod error;
pub mod rollup;
pub mod search;
pub mod set;
pub mod stats;
pub mod task_worker;

pub use audit::AuditWorker;
pub use error::WorkerError;
pub use rollup::ContentRollupWorker;
pub use search::SearchWorker;
pub use set::{PanicPolicy, WorkerSet};
pub use stats::BusStatsReporter;
pub use task_worker::{run_task_worker, TaskWorker};
