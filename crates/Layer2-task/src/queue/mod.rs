//! Task queues
//!
//! - `TaskQueue` - spawns real children, bounded by the parallelism limit
//! - `DryRunQueue` - walks the batch without spawning anything
//!
//! Both implement `TaskRunner`, so drivers can pick one at runtime.

pub mod dry_run;
pub mod local;
pub mod r#trait;

pub use dry_run::DryRunQueue;
pub use local::TaskQueue;
pub use r#trait::TaskRunner;

use serde::{Deserialize, Serialize};

/// Counters for one `execute` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Tasks that reached Executing
    pub launched: usize,
    /// Tasks that exited normally (any code)
    pub exited: usize,
    /// Tasks killed by a signal
    pub signalled: usize,
    /// Queued tasks discarded after the batch stopped
    pub dropped: usize,
    /// Largest number of tasks executing at the same time
    pub peak_executing: usize,
}

impl BatchStats {
    /// Tasks that were reaped and reported
    pub fn completed(&self) -> usize {
        self.exited + self.signalled
    }
}
