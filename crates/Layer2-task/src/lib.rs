//! # sluice-task
//!
//! Bounded-parallelism subprocess scheduling for Sluice.
//! Launches a backlog of commands as child processes, caps how many run at once,
//! captures their output and reports each outcome through caller callbacks.
//!
//! ## Features
//!
//! - FIFO admission under a parallelism limit
//! - One `poll(2)` across all running children instead of busy-polling
//! - Byte-exact output capture, stderr merged or separate
//! - Exit vs. signal classification with resource usage from `wait4`
//! - Callback verdicts that stop admission without killing running children
//! - Dry-run queue behind the same `TaskRunner` trait

pub mod callbacks;
pub mod process;
pub mod queue;
mod readiness;
pub mod state;
pub mod task;

// Task system
pub use callbacks::{TaskCallbacks, TaskVerdict};
pub use process::{describe_signal, ResourceUsage, Signal, Termination};
pub use state::TaskState;
pub use task::{Task, TaskId, TaskSpec};

// Queues
pub use queue::{BatchStats, DryRunQueue, TaskQueue, TaskRunner};
