//! Task definition and lifecycle

use crate::process::{Drain, ResourceUsage, Signal, SpawnedProcess, Termination};
use crate::state::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_foundation::{parse_env_entry, validate_env_entries, EnvironmentProvider, Error, Result};
use std::ffi::OsString;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// What to run: program, arguments, environment override and stream wiring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Executable path (or name resolved through `PATH`)
    pub program: String,

    /// Arguments, not including the program itself
    pub args: Vec<String>,

    /// `KEY=VALUE` entries. Empty means inherit from the queue's environment provider.
    pub env: Vec<String>,

    /// Capture stderr separately. `None` uses the queue default.
    pub separate_errors: Option<bool>,
}

impl TaskSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env.extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn separate_errors(mut self, separate: bool) -> Self {
        self.separate_errors = Some(separate);
        self
    }

    /// Program followed by its arguments, space separated
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One external command invocation, from enqueue to reaping.
///
/// `C` is the caller's context; the queue never looks inside it.
#[derive(Debug)]
pub struct Task<C> {
    id: TaskId,
    spec: TaskSpec,
    context: C,
    separate_errors: bool,
    state: TaskState,
    pid: Option<u32>,
    process: Option<SpawnedProcess>,
    output: Vec<u8>,
    errors: Vec<u8>,
    termination: Option<Termination>,
    usage: Option<ResourceUsage>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl<C> Task<C> {
    /// Create a task in the Preparing state. Rejects malformed environment entries.
    pub fn new(spec: TaskSpec, context: C, default_separate_errors: bool) -> Result<Self> {
        validate_env_entries(&spec.env)?;
        let separate_errors = spec.separate_errors.unwrap_or(default_separate_errors);

        Ok(Self {
            id: TaskId::new(),
            spec,
            context,
            separate_errors,
            state: TaskState::Preparing,
            pid: None,
            process: None,
            output: Vec::new(),
            errors: Vec::new(),
            termination: None,
            usage: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the child. On failure the task is Finished and never executes.
    pub(crate) fn execute(&mut self, environment: &dyn EnvironmentProvider) -> Result<()> {
        self.transition(TaskState::Executing);

        let env = self.resolve_environment(environment)?;
        match SpawnedProcess::spawn(&self.spec.program, &self.spec.args, &env, self.separate_errors)
        {
            Ok(process) => {
                let pid = process.pid();
                debug!(task = %self.id, pid, program = %self.spec.program, "Spawned task");
                self.pid = Some(pid);
                self.process = Some(process);
                self.state = TaskState::Executing;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                warn!(task = %self.id, program = %self.spec.program, error = %e, "Spawn failed");
                self.state = TaskState::Finished;
                self.completed_at = Some(Utc::now());
                Err(Error::spawn(self.spec.program.clone(), e))
            }
        }
    }

    /// Drain everything currently available. Returns true once stdout reached EOF.
    pub(crate) fn read_from_pipes(&mut self) -> Result<bool> {
        let Some(process) = self.process.as_mut() else {
            return Ok(true);
        };
        match process.read_available(&mut self.output, &mut self.errors) {
            Ok(drain) => Ok(drain == Drain::Closed),
            Err(e) => Err(Error::pipe_read(process.pid(), e)),
        }
    }

    /// Block until the child and anything sharing its pipes closed them, capturing
    /// the rest of the output. The task stays Executing.
    pub(crate) fn read_to_close(&mut self) -> Result<()> {
        let Some(process) = self.process.as_mut() else {
            return Ok(());
        };
        process
            .read_to_close(&mut self.output, &mut self.errors)
            .map_err(|e| Error::pipe_read(process.pid(), e))
    }

    /// Final drain, close every descriptor, move to Finished.
    ///
    /// # Panics
    ///
    /// If the task is not Executing. Finishing twice is a logic error in the caller.
    pub(crate) fn finish_execution(&mut self) -> Result<()> {
        assert!(
            self.state == TaskState::Executing,
            "finish_execution called on task {} in state {}",
            self.id,
            self.state
        );

        let drained = self.read_from_pipes();
        if let Some(process) = self.process.as_mut() {
            process.close_pipes();
        }
        self.state = TaskState::Finished;
        self.completed_at = Some(Utc::now());
        drained.map(|_| ())
    }

    /// Wait for the child to exit and record how it terminated.
    ///
    /// Independent of `finish_execution`; either may come first.
    ///
    /// # Panics
    ///
    /// If the task never spawned or was already reaped.
    pub(crate) fn reap(&mut self) -> Result<&Termination> {
        assert!(
            self.termination.is_none(),
            "task {} reaped twice",
            self.id
        );
        let Some(process) = self.process.as_ref() else {
            panic!("task {} has no process to reap", self.id);
        };

        let (status, usage) = process
            .wait()
            .map_err(|e| Error::wait(process.pid(), e))?;
        let termination = Termination::from_status(status);
        debug!(task = %self.id, pid = process.pid(), %termination, "Reaped task");

        self.usage = Some(usage);
        Ok(self.termination.insert(termination))
    }

    /// Mark the task as running under a made-up pid without spawning anything
    pub(crate) fn simulate_start(&mut self, pid: u32) {
        self.transition(TaskState::Executing);
        self.pid = Some(pid);
        self.state = TaskState::Executing;
        self.started_at = Some(Utc::now());
    }

    /// Complete a simulated run with a clean exit
    pub(crate) fn simulate_exit(&mut self) {
        self.transition(TaskState::Finished);
        self.state = TaskState::Finished;
        self.termination = Some(Termination::Exited(0));
        self.usage = Some(ResourceUsage::default());
        self.completed_at = Some(Utc::now());
    }

    fn transition(&self, next: TaskState) {
        assert!(
            self.state.can_transition_to(next),
            "task {} cannot move from {} to {}",
            self.id,
            self.state,
            next
        );
    }

    fn resolve_environment(
        &self,
        environment: &dyn EnvironmentProvider,
    ) -> Result<Vec<(OsString, OsString)>> {
        if self.spec.env.is_empty() {
            return Ok(environment.vars());
        }
        self.spec
            .env
            .iter()
            .map(|entry| {
                let (key, value) = parse_env_entry(entry)?;
                Ok((OsString::from(key), OsString::from(value)))
            })
            .collect()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn program(&self) -> &str {
        &self.spec.program
    }

    pub fn args(&self) -> &[String] {
        &self.spec.args
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn separate_errors(&self) -> bool {
        self.separate_errors
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Set once the task starts executing
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Captured stdout, plus stderr when the streams are merged
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Captured stderr. `None` when stderr is merged into the output.
    pub fn errors(&self) -> Option<&[u8]> {
        self.separate_errors.then_some(self.errors.as_slice())
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.termination.as_ref().and_then(Termination::exit_code)
    }

    pub fn signal(&self) -> Option<&Signal> {
        self.termination.as_ref().and_then(Termination::signal)
    }

    pub fn usage(&self) -> Option<&ResourceUsage> {
        self.usage.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Get execution duration if task has started
    pub fn duration(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - start).to_std().unwrap_or_default())
    }

    /// Whether the child still holds resources the queue must release
    pub(crate) fn has_open_pipes(&self) -> bool {
        self.process
            .as_ref()
            .map(SpawnedProcess::has_open_pipes)
            .unwrap_or(false)
    }

    pub(crate) fn stdout_fd(&self) -> Option<std::os::fd::RawFd> {
        self.process.as_ref().and_then(SpawnedProcess::stdout_fd)
    }
}
