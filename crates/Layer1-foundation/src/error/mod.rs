//! Error types for Sluice
//!
//! Every failure the scheduler can surface is collected here so the task layer and
//! the CLI share one taxonomy.

use std::io;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sluice error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid environment entry '{0}': expected KEY=VALUE")]
    InvalidEnv(String),

    // ========================================================================
    // Process lifecycle
    // ========================================================================
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Readiness wait failed: {0}")]
    Readiness(#[source] io::Error),

    #[error("Failed to read output of process {pid}: {source}")]
    PipeRead {
        pid: u32,
        #[source]
        source: io::Error,
    },

    // ========================================================================
    // Policy
    // ========================================================================
    #[error("Batch stopped: {0}")]
    Stopped(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that abort a batch regardless of callback verdicts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Spawn { .. }
                | Error::Wait { .. }
                | Error::Readiness(_)
                | Error::PipeRead { .. }
                | Error::Io(_)
        )
    }

    /// True when a terminal callback (or the default policy) asked the batch to stop
    pub fn is_policy_stop(&self) -> bool {
        matches!(self, Error::Stopped(_))
    }

    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Error::Spawn {
            program: program.into(),
            source,
        }
    }

    pub fn wait(pid: u32, source: io::Error) -> Self {
        Error::Wait { pid, source }
    }

    pub fn pipe_read(pid: u32, source: io::Error) -> Self {
        Error::PipeRead { pid, source }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
