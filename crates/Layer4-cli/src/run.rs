//! `sluice run` - execute a batch file

use crate::report::{BatchReport, TaskReport};
use anyhow::Context;
use sluice_foundation::{BatchFile, DefaultPolicy, QueueConfig, SluiceConfig, TaskEntry};
use sluice_task::{
    DryRunQueue, Task, TaskCallbacks, TaskQueue, TaskRunner, TaskSpec,
};
use std::cell::RefCell;
use std::path::PathBuf;
use tracing::{debug, info};

/// Options collected from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub batch: PathBuf,
    pub jobs: Option<usize>,
    pub keep_going: bool,
    pub separate_errors: bool,
    pub dry_run: bool,
    pub json: bool,
}

impl RunOptions {
    /// Layered config, then the batch file's `[queue]`, then command-line flags
    pub fn queue_config(&self, mut config: SluiceConfig, batch: &BatchFile) -> QueueConfig {
        config.queue.merge(batch.queue.clone());
        let mut queue = config.queue_config();

        if let Some(jobs) = self.jobs {
            queue.parallelism = jobs;
        }
        if self.separate_errors {
            queue = queue.with_separate_errors(true);
        }
        if self.keep_going {
            queue = queue.with_policy(DefaultPolicy::keep_going());
        }
        queue
    }
}

pub fn task_spec(entry: &TaskEntry) -> TaskSpec {
    TaskSpec {
        program: entry.program.clone(),
        args: entry.args.clone(),
        env: entry.env.clone(),
        separate_errors: entry.separate_errors,
    }
}

/// Run the batch. Returns whether it succeeded.
pub fn run_batch(options: &RunOptions) -> anyhow::Result<bool> {
    let batch = BatchFile::load(&options.batch)
        .with_context(|| format!("Failed to load batch {}", options.batch.display()))?;
    let config = SluiceConfig::load().context("Failed to load configuration")?;
    let queue_config = options.queue_config(config, &batch);

    let mut runner: Box<dyn TaskRunner<usize>> = if options.dry_run {
        Box::new(DryRunQueue::new(queue_config))
    } else {
        Box::new(TaskQueue::new(queue_config))
    };
    info!(
        runner = runner.name(),
        tasks = batch.len(),
        parallelism = runner.parallelism_limit(),
        "Running batch"
    );

    for (index, entry) in batch.tasks.iter().enumerate() {
        let id = runner.add_task(task_spec(entry), index)?;
        debug!(task = %id, name = entry.display_name(), "Queued");
    }

    let reports = RefCell::new(Vec::new());
    let record = |task: &Task<usize>| {
        let name = batch
            .tasks
            .get(*task.context())
            .map(TaskEntry::display_name)
            .unwrap_or_else(|| task.program());
        let report = TaskReport::from_task(name, task);
        if !options.json {
            report.print_text();
        }
        reports.borrow_mut().push(report);
    };

    let result = runner.execute(
        TaskCallbacks::new()
            .on_began(|task: &Task<usize>| {
                debug!(pid = ?task.pid(), command = %task.spec().command_line(), "Began");
            })
            .on_reported(record),
    );

    let report = BatchReport {
        runner: runner.name(),
        success: result.is_ok(),
        error: result.as_ref().err().map(ToString::to_string),
        stats: runner.stats(),
        tasks: reports.into_inner(),
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_summary();
    }

    Ok(report.success)
}
