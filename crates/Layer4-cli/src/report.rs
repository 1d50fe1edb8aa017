//! Outcome reports, printed as text while the batch runs or as JSON at the end

use serde::Serialize;
use sluice_task::{BatchStats, ResourceUsage, Task, Termination};

/// What happened to one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub command: String,
    pub pid: Option<u32>,
    pub termination: Option<Termination>,
    pub output: String,
    /// Only present when stderr was captured separately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
    pub duration_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResourceUsage>,
}

impl TaskReport {
    pub fn from_task(name: &str, task: &Task<usize>) -> Self {
        Self {
            name: name.to_string(),
            command: task.spec().command_line(),
            pid: task.pid(),
            termination: task.termination().cloned(),
            output: String::from_utf8_lossy(task.output()).into_owned(),
            errors: task
                .errors()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            duration_ms: task.duration().map(|d| d.as_millis()),
            usage: task.usage().copied(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.termination
            .as_ref()
            .map(Termination::is_success)
            .unwrap_or(false)
    }

    /// One status line followed by captured output
    pub fn print_text(&self) {
        let status = if self.succeeded() { "✓" } else { "✗" };
        let outcome = self
            .termination
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "not reaped".to_string());
        match self.duration_ms {
            Some(ms) => println!("{} {} ({}, {}ms)", status, self.name, outcome, ms),
            None => println!("{} {} ({})", status, self.name, outcome),
        }

        print_block(&self.output);
        if let Some(errors) = self.errors.as_deref().filter(|e| !e.is_empty()) {
            println!("  --- stderr ---");
            print_block(errors);
        }
    }
}

fn print_block(text: &str) {
    for line in text.lines() {
        println!("  {}", line);
    }
}

/// Everything `sluice run --json` prints
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub runner: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: BatchStats,
    pub tasks: Vec<TaskReport>,
}

impl BatchReport {
    pub fn print_summary(&self) {
        println!(
            "\n{} launched, {} exited, {} signalled, {} dropped (peak {} running)",
            self.stats.launched,
            self.stats.exited,
            self.stats.signalled,
            self.stats.dropped,
            self.stats.peak_executing
        );
        if let Some(error) = &self.error {
            eprintln!("Batch failed: {}", error);
        }
    }
}
