//! Callbacks - how callers observe tasks and decide whether the batch continues

use crate::process::{Signal, Termination};
use crate::task::Task;
use serde::{Deserialize, Serialize};
use sluice_foundation::DefaultPolicy;

/// Decision returned by a terminal callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskVerdict {
    /// Keep admitting queued tasks
    #[default]
    Continue,
    /// Admit nothing more; running tasks still finish
    Stop,
}

impl TaskVerdict {
    pub fn is_stop(&self) -> bool {
        matches!(self, TaskVerdict::Stop)
    }

    pub fn from_stop(stop: bool) -> Self {
        if stop {
            TaskVerdict::Stop
        } else {
            TaskVerdict::Continue
        }
    }
}

type BeganFn<'a, C> = Box<dyn FnMut(&Task<C>) + 'a>;
type FinishedFn<'a, C> = Box<dyn FnMut(&Task<C>, i32) -> TaskVerdict + 'a>;
type SignalledFn<'a, C> = Box<dyn FnMut(&Task<C>, &Signal) -> TaskVerdict + 'a>;
type ReportedFn<'a, C> = Box<dyn FnMut(&Task<C>) + 'a>;

/// Caller hooks for one `execute` call.
///
/// Every hook is optional. A missing terminal hook defers to the queue's
/// `DefaultPolicy`. `on_reported` only observes and never affects the verdict.
pub struct TaskCallbacks<'a, C> {
    began: Option<BeganFn<'a, C>>,
    finished: Option<FinishedFn<'a, C>>,
    signalled: Option<SignalledFn<'a, C>>,
    reported: Option<ReportedFn<'a, C>>,
}

impl<C> Default for TaskCallbacks<'_, C> {
    fn default() -> Self {
        Self {
            began: None,
            finished: None,
            signalled: None,
            reported: None,
        }
    }
}

impl<C> std::fmt::Debug for TaskCallbacks<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCallbacks")
            .field("began", &self.began.is_some())
            .field("finished", &self.finished.is_some())
            .field("signalled", &self.signalled.is_some())
            .field("reported", &self.reported.is_some())
            .finish()
    }
}

impl<'a, C> TaskCallbacks<'a, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired the instant a task starts executing
    pub fn on_began(mut self, f: impl FnMut(&Task<C>) + 'a) -> Self {
        self.began = Some(Box::new(f));
        self
    }

    /// Fired when a task exits normally, with its exit code
    pub fn on_finished(mut self, f: impl FnMut(&Task<C>, i32) -> TaskVerdict + 'a) -> Self {
        self.finished = Some(Box::new(f));
        self
    }

    /// Fired when a task is killed by a signal
    pub fn on_signalled(
        mut self,
        f: impl FnMut(&Task<C>, &Signal) -> TaskVerdict + 'a,
    ) -> Self {
        self.signalled = Some(Box::new(f));
        self
    }

    /// Fired once for every reaped task, before its terminal hook
    pub fn on_reported(mut self, f: impl FnMut(&Task<C>) + 'a) -> Self {
        self.reported = Some(Box::new(f));
        self
    }

    pub(crate) fn began(&mut self, task: &Task<C>) {
        if let Some(f) = self.began.as_mut() {
            f(task);
        }
    }

    /// Dispatch the terminal hook matching how the task ended
    pub(crate) fn terminated(&mut self, task: &Task<C>, policy: &DefaultPolicy) -> TaskVerdict {
        if task.termination().is_some() {
            if let Some(f) = self.reported.as_mut() {
                f(task);
            }
        }
        match task.termination() {
            Some(Termination::Exited(code)) => match self.finished.as_mut() {
                Some(f) => f(task, *code),
                None => TaskVerdict::from_stop(policy.stops_on_exit(*code)),
            },
            Some(Termination::Signalled(signal)) => match self.signalled.as_mut() {
                Some(f) => f(task, signal),
                None => TaskVerdict::from_stop(policy.stops_on_signal()),
            },
            // Never reaped: nothing to report
            None => TaskVerdict::Continue,
        }
    }
}
