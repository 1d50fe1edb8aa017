//! Task state machine

use serde::{Deserialize, Serialize};

/// Lifecycle of a task: Preparing → Executing → Finished.
///
/// A task whose spawn fails goes straight from Preparing to Finished and never
/// executes. No other transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Enqueued, not yet spawned
    Preparing,

    /// Child process running, output being captured
    Executing,

    /// Descriptors closed, output frozen
    Finished,
}

impl TaskState {
    /// Check whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Preparing, TaskState::Executing)
                | (TaskState::Preparing, TaskState::Finished)
                | (TaskState::Executing, TaskState::Finished)
        )
    }

    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished)
    }

    /// Check if task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Executing)
    }

    /// Check if task is pending (not yet started)
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Preparing)
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::Preparing => "Preparing",
            TaskState::Executing => "Executing",
            TaskState::Finished => "Finished",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
