//! Dry-run queue - reports a batch as if every task succeeded, without spawning

use crate::callbacks::TaskCallbacks;
use crate::queue::{BatchStats, TaskRunner};
use crate::task::{Task, TaskId, TaskSpec};
use sluice_foundation::{Error, QueueConfig, Result};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Walks queued tasks one at a time in FIFO order.
///
/// Each task gets a synthetic pid (counting up from 1), `on_began`, then a clean
/// exit with code 0 and empty output. A `Stop` verdict drops the rest of the queue.
pub struct DryRunQueue<C> {
    config: QueueConfig,
    pending: VecDeque<Task<C>>,
    stats: BatchStats,
}

impl<C> DryRunQueue<C> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            stats: BatchStats::default(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<C> TaskRunner<C> for DryRunQueue<C> {
    fn add_task(&mut self, spec: TaskSpec, context: C) -> Result<TaskId> {
        let task = Task::new(spec, context, self.config.separate_errors)?;
        let id = task.id();
        self.pending.push_back(task);
        Ok(id)
    }

    fn execute(&mut self, mut callbacks: TaskCallbacks<'_, C>) -> Result<()> {
        self.stats = BatchStats::default();
        let mut next_pid = 1u32;
        let mut stopped = None;

        while let Some(mut task) = self.pending.pop_front() {
            task.simulate_start(next_pid);
            next_pid += 1;
            self.stats.launched += 1;
            self.stats.peak_executing = 1;
            callbacks.began(&task);

            task.simulate_exit();
            self.stats.exited += 1;
            debug!(task = %task.id(), command = %task.spec().command_line(), "Would run");

            if callbacks.terminated(&task, &self.config.policy).is_stop() {
                stopped = Some(Error::Stopped(format!(
                    "'{}' stopped the dry run",
                    task.spec().command_line()
                )));
                break;
            }
        }

        self.stats.dropped = self.pending.len();
        self.pending.clear();
        info!(
            listed = self.stats.launched,
            dropped = self.stats.dropped,
            "Dry run complete"
        );

        match stopped {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn parallelism_limit(&self) -> usize {
        self.config.effective_parallelism()
    }

    fn supports_buffered_output(&self) -> bool {
        false
    }

    fn supports_parallel_execution(&self) -> bool {
        false
    }

    fn stats(&self) -> BatchStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
