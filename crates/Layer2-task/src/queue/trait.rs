//! Runner trait

use crate::callbacks::TaskCallbacks;
use crate::queue::BatchStats;
use crate::task::{TaskId, TaskSpec};
use sluice_foundation::Result;

/// TaskRunner trait - implement to add new ways of running a batch
pub trait TaskRunner<C> {
    /// Enqueue a task. Only the environment entries are validated here.
    fn add_task(&mut self, spec: TaskSpec, context: C) -> Result<TaskId>;

    /// Run every queued task. `Err` means the batch failed; the first failure wins.
    fn execute(&mut self, callbacks: TaskCallbacks<'_, C>) -> Result<()>;

    /// Maximum number of tasks executing at once (at least 1)
    fn parallelism_limit(&self) -> usize;

    /// Whether finished tasks carry the bytes their child wrote
    fn supports_buffered_output(&self) -> bool;

    /// Whether more than one child can run at a time
    fn supports_parallel_execution(&self) -> bool;

    /// Counters for the most recent `execute`
    fn stats(&self) -> BatchStats;

    /// Get runner name
    fn name(&self) -> &'static str;
}
