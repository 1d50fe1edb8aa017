//! Queue Configuration - parallelism budget and default outcome policy

use serde::{Deserialize, Serialize};

/// What to do with a clean exit when no finished callback was supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingFinishedPolicy {
    /// Any nonzero exit code stops the batch
    #[default]
    TreatNonZeroAsFailure,
    /// Exit codes never stop the batch
    IgnoreNonZero,
}

/// What to do with a signal death when no signalled callback was supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingSignalledPolicy {
    /// Any signal stops the batch
    #[default]
    TreatAnySignalAsFailure,
    /// Signals never stop the batch
    IgnoreSignals,
}

/// Verdicts applied when the caller leaves a terminal callback out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DefaultPolicy {
    #[serde(default)]
    pub on_missing_finished: MissingFinishedPolicy,
    #[serde(default)]
    pub on_missing_signalled: MissingSignalledPolicy,
}

impl DefaultPolicy {
    /// Never stop on exit codes or signals
    pub fn keep_going() -> Self {
        Self {
            on_missing_finished: MissingFinishedPolicy::IgnoreNonZero,
            on_missing_signalled: MissingSignalledPolicy::IgnoreSignals,
        }
    }

    /// Whether a clean exit with `exit_code` should stop the batch
    pub fn stops_on_exit(&self, exit_code: i32) -> bool {
        match self.on_missing_finished {
            MissingFinishedPolicy::TreatNonZeroAsFailure => exit_code != 0,
            MissingFinishedPolicy::IgnoreNonZero => false,
        }
    }

    /// Whether a signal death should stop the batch
    pub fn stops_on_signal(&self) -> bool {
        matches!(
            self.on_missing_signalled,
            MissingSignalledPolicy::TreatAnySignalAsFailure
        )
    }
}

/// Fully resolved queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of simultaneously executing tasks. 0 is treated as 1.
    pub parallelism: usize,

    /// Capture stderr separately unless a task says otherwise
    pub separate_errors: bool,

    /// Verdicts for missing callbacks
    pub policy: DefaultPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            separate_errors: false,
            policy: DefaultPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism,
            ..Self::default()
        }
    }

    /// The parallelism budget actually enforced (never below 1)
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }

    pub fn with_policy(mut self, policy: DefaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_separate_errors(mut self, separate: bool) -> Self {
        self.separate_errors = separate;
        self
    }
}

/// Host parallelism, falling back to 1 when it cannot be determined
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Partial queue settings as they appear in config and batch files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separate_errors: Option<bool>,

    #[serde(default)]
    pub policy: PolicySettings,
}

/// Partial policy settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_missing_finished: Option<MissingFinishedPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_missing_signalled: Option<MissingSignalledPolicy>,
}

impl QueueSettings {
    /// Merge with another layer (other wins where set)
    pub fn merge(&mut self, other: QueueSettings) {
        if other.parallelism.is_some() {
            self.parallelism = other.parallelism;
        }
        if other.separate_errors.is_some() {
            self.separate_errors = other.separate_errors;
        }
        if other.policy.on_missing_finished.is_some() {
            self.policy.on_missing_finished = other.policy.on_missing_finished;
        }
        if other.policy.on_missing_signalled.is_some() {
            self.policy.on_missing_signalled = other.policy.on_missing_signalled;
        }
    }

    /// Fill unset values from the defaults
    pub fn resolve(&self) -> QueueConfig {
        let defaults = QueueConfig::default();
        QueueConfig {
            parallelism: self.parallelism.unwrap_or(defaults.parallelism),
            separate_errors: self.separate_errors.unwrap_or(defaults.separate_errors),
            policy: DefaultPolicy {
                on_missing_finished: self
                    .policy
                    .on_missing_finished
                    .unwrap_or(defaults.policy.on_missing_finished),
                on_missing_signalled: self
                    .policy
                    .on_missing_signalled
                    .unwrap_or(defaults.policy.on_missing_signalled),
            },
        }
    }
}
