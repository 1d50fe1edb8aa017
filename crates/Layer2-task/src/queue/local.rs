//! Local queue - runs tasks as child processes on the host
//!
//! One thread drives everything. Each iteration admits queued tasks up to the
//! parallelism limit, blocks in a single `poll(2)` across the stdout pipes of all
//! executing tasks, then drains and reaps whatever became ready.
//!
//! A readiness or wait failure aborts the batch. Tasks already running are not
//! killed: their pipes are read to the end one task at a time, then each is reaped
//! and reported as usual.
//!
//! Only stdout is polled. When stderr is captured separately it is drained on every
//! stdout event and once more after the child exits, so a child that fills its
//! stderr pipe without touching stdout blocks until it exits or writes to stdout.

use crate::callbacks::{TaskCallbacks, TaskVerdict};
use crate::process::Termination;
use crate::queue::{BatchStats, TaskRunner};
use crate::readiness::{ReadinessSet, ReadyEvent};
use crate::task::{Task, TaskId, TaskSpec};
use sluice_foundation::{AmbientEnvironment, EnvironmentProvider, Error, QueueConfig, Result};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, error, info, warn};

/// First failure of a batch. Later failures are logged and discarded.
#[derive(Debug, Default)]
struct StopLatch {
    first: Option<Error>,
}

impl StopLatch {
    fn latch(&mut self, err: Error) {
        if self.first.is_none() {
            warn!(error = %err, "Batch stop latched");
            self.first = Some(err);
        } else {
            debug!(error = %err, "Additional failure after stop");
        }
    }

    fn is_latched(&self) -> bool {
        self.first.is_some()
    }

    fn into_result(self) -> Result<()> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Bounded-parallelism queue of child processes.
///
/// Tasks run in FIFO admission order. Running tasks are never killed: once a stop
/// is latched the queue only stops admitting and waits for what is already running.
pub struct TaskQueue<C> {
    config: QueueConfig,
    environment: Box<dyn EnvironmentProvider>,
    pending: VecDeque<Task<C>>,
    executing: HashMap<TaskId, Task<C>>,
    /// Only holds pids of tasks that have not been reaped yet
    pids: HashMap<u32, TaskId>,
    stats: BatchStats,
}

impl<C> TaskQueue<C> {
    /// Create a queue whose children inherit this process's environment
    pub fn new(config: QueueConfig) -> Self {
        Self::with_environment(config, AmbientEnvironment)
    }

    /// Create a queue with an explicit environment provider
    pub fn with_environment(
        config: QueueConfig,
        environment: impl EnvironmentProvider + 'static,
    ) -> Self {
        Self {
            config,
            environment: Box::new(environment),
            pending: VecDeque::new(),
            executing: HashMap::new(),
            pids: HashMap::new(),
            stats: BatchStats::default(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of tasks waiting to be admitted
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Task currently executing under `pid`, if any
    pub fn task_for_pid(&self, pid: u32) -> Option<TaskId> {
        self.pids.get(&pid).copied()
    }

    // ========================================================================
    // Control loop
    // ========================================================================

    fn run(&mut self, callbacks: &mut TaskCallbacks<'_, C>) -> StopLatch {
        let limit = self.parallelism_limit();
        let mut readiness = ReadinessSet::new();
        let mut latch = StopLatch::default();

        info!(
            queued = self.pending.len(),
            parallelism = limit,
            "Starting batch"
        );

        'batch: while (!self.pending.is_empty() && !latch.is_latched())
            || !self.executing.is_empty()
        {
            self.admit(limit, callbacks, &mut readiness, &mut latch);
            if self.executing.is_empty() {
                continue;
            }

            let events = match readiness.wait() {
                Ok(events) => events,
                Err(e) => {
                    error!(error = %e, "Readiness wait failed");
                    latch.latch(Error::Readiness(e));
                    break 'batch;
                }
            };

            for event in events {
                if let Err(e) = self.service(event, callbacks, &mut readiness, &mut latch) {
                    error!(error = %e, "Aborting batch");
                    latch.latch(e);
                    break 'batch;
                }
            }

            readiness.compact();
            debug!(
                watching = readiness.len(),
                queued = self.pending.len(),
                "Loop iteration done"
            );
        }

        if !self.executing.is_empty() {
            readiness.clear();
            self.abort(callbacks, &mut latch);
        }

        latch
    }

    /// Spawn queued tasks while capacity remains and nothing has stopped the batch
    fn admit(
        &mut self,
        limit: usize,
        callbacks: &mut TaskCallbacks<'_, C>,
        readiness: &mut ReadinessSet,
        latch: &mut StopLatch,
    ) {
        while !latch.is_latched() && self.executing.len() < limit {
            let Some(mut task) = self.pending.pop_front() else {
                break;
            };

            if let Err(e) = task.execute(self.environment.as_ref()) {
                // No callback for a task that never ran; it is dropped here
                latch.latch(e);
                break;
            }

            let id = task.id();
            self.stats.launched += 1;
            callbacks.began(&task);

            if let Some(fd) = task.stdout_fd() {
                readiness.register(fd, id);
            }
            if let Some(pid) = task.pid() {
                self.pids.insert(pid, id);
            }
            self.executing.insert(id, task);
            self.stats.peak_executing = self.stats.peak_executing.max(self.executing.len());

            debug!(
                task = %id,
                executing = self.executing.len(),
                queued = self.pending.len(),
                "Admitted task"
            );
        }
    }

    /// Handle one readiness event. `Err` aborts the batch.
    fn service(
        &mut self,
        event: ReadyEvent,
        callbacks: &mut TaskCallbacks<'_, C>,
        readiness: &mut ReadinessSet,
        latch: &mut StopLatch,
    ) -> Result<()> {
        let Some(task) = self.executing.get_mut(&event.owner) else {
            readiness.mark_finished(event.index);
            return Ok(());
        };

        let mut done = event.hung_up;
        if event.readable {
            done |= task.read_from_pipes()?;
        }
        if !done {
            return Ok(());
        }

        readiness.mark_finished(event.index);
        self.retire(event.owner, callbacks, latch)
    }

    /// Reap, finish and report one task. `Err` means the child could not be waited
    /// for (or its pipes could not be read) and the batch must abort.
    fn retire(
        &mut self,
        id: TaskId,
        callbacks: &mut TaskCallbacks<'_, C>,
        latch: &mut StopLatch,
    ) -> Result<()> {
        let Some(mut task) = self.executing.remove(&id) else {
            return Ok(());
        };
        if let Some(pid) = task.pid() {
            self.pids.remove(&pid);
        }

        let reaped = task.reap().map(|_| ());
        let drained = if task.state().is_running() {
            task.finish_execution()
        } else {
            Ok(())
        };
        debug_assert!(!task.has_open_pipes());
        // A child we cannot wait for gets no terminal callback
        reaped?;

        match task.termination() {
            Some(Termination::Exited(_)) => self.stats.exited += 1,
            Some(Termination::Signalled(_)) => self.stats.signalled += 1,
            None => {}
        }

        let verdict = callbacks.terminated(&task, &self.config.policy);
        if let Some(termination) = task.termination() {
            info!(
                task = %id,
                command = %task.spec().command_line(),
                %termination,
                verdict = ?verdict,
                "Task finished"
            );
            if verdict == TaskVerdict::Stop {
                latch.latch(Error::Stopped(format!(
                    "'{}' {}",
                    task.spec().command_line(),
                    termination
                )));
            }
        }

        drained
    }

    /// Let every task still executing run to completion without polling: read each
    /// one's pipes until its writers close them, then reap and report it. Nothing
    /// is admitted and no descriptor is closed while its child may still write.
    fn abort(&mut self, callbacks: &mut TaskCallbacks<'_, C>, latch: &mut StopLatch) {
        warn!(
            executing = self.executing.len(),
            "Finishing executing tasks after abort"
        );

        let ids: Vec<TaskId> = self.executing.keys().copied().collect();
        for id in ids {
            if let Some(task) = self.executing.get_mut(&id) {
                if let Err(e) = task.read_to_close() {
                    debug!(task = %id, error = %e, "Draining after abort failed");
                    latch.latch(e);
                    // Unreadable pipes must not leave the child blocked while we wait for it
                    if let Err(e) = task.finish_execution() {
                        debug!(task = %id, error = %e, "Final drain failed");
                    }
                }
            }
            if let Err(e) = self.retire(id, callbacks, latch) {
                latch.latch(e);
            }
        }
    }
}

impl<C> TaskRunner<C> for TaskQueue<C> {
    fn add_task(&mut self, spec: TaskSpec, context: C) -> Result<TaskId> {
        let task = Task::new(spec, context, self.config.separate_errors)?;
        let id = task.id();
        debug!(task = %id, command = %task.spec().command_line(), "Queued task");
        self.pending.push_back(task);
        Ok(id)
    }

    fn execute(&mut self, mut callbacks: TaskCallbacks<'_, C>) -> Result<()> {
        self.stats = BatchStats::default();

        let latch = self.run(&mut callbacks);

        self.stats.dropped = self.pending.len();
        if self.stats.dropped > 0 {
            info!(dropped = self.stats.dropped, "Dropped queued tasks");
        }
        self.pending.clear();
        self.pids.clear();

        info!(
            launched = self.stats.launched,
            exited = self.stats.exited,
            signalled = self.stats.signalled,
            "Batch complete"
        );
        latch.into_result()
    }

    fn parallelism_limit(&self) -> usize {
        self.config.effective_parallelism()
    }

    fn supports_buffered_output(&self) -> bool {
        true
    }

    fn supports_parallel_execution(&self) -> bool {
        true
    }

    fn stats(&self) -> BatchStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
