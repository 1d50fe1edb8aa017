//! Batch files - a list of commands plus optional queue overrides
//!
//! ```toml
//! [queue]
//! parallelism = 4
//!
//! [[task]]
//! name = "compile main"
//! program = "cc"
//! args = ["-c", "main.c"]
//! env = ["LANG=C"]
//! ```

use crate::env::validate_env_entries;
use crate::storage::load_path;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::QueueSettings;

/// One command invocation in a batch file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Label shown in reports (defaults to the program)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Executable path or name
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// `KEY=VALUE` overrides; empty inherits the ambient environment
    #[serde(default)]
    pub env: Vec<String>,

    /// Per-task override of the queue's `separate_errors`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separate_errors: Option<bool>,
}

impl TaskEntry {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: None,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            separate_errors: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.program)
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::Config(format!(
                "Task '{}' has an empty program",
                self.display_name()
            )));
        }
        validate_env_entries(&self.env)
    }
}

/// A batch of tasks to run through one queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskEntry>,
}

impl BatchFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let batch: BatchFile = load_path(path.as_ref())?;
        batch.validate()?;
        Ok(batch)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let batch: BatchFile = ::toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse batch: {}", e)))?;
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        self.tasks.iter().try_for_each(TaskEntry::validate)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
