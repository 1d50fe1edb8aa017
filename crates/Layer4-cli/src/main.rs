//! Sluice CLI - Main entry point

mod check;
mod init;
mod report;
mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sluice - run batches of commands with bounded parallelism
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every task in a batch file
    Run {
        /// Batch file (TOML)
        batch: PathBuf,

        /// Maximum number of tasks running at once
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Never stop on failed or signalled tasks
        #[arg(short, long)]
        keep_going: bool,

        /// Capture stderr separately for every task
        #[arg(long)]
        separate_errors: bool,

        /// List what would run without spawning anything
        #[arg(long)]
        dry_run: bool,

        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },
    /// Validate a batch file without running it
    Check {
        /// Batch file (TOML)
        batch: PathBuf,
    },
    /// Write a default .sluice/config.toml in the current directory
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let succeeded = match args.command {
        Command::Run {
            batch,
            jobs,
            keep_going,
            separate_errors,
            dry_run,
            json,
        } => run::run_batch(&run::RunOptions {
            batch,
            jobs,
            keep_going,
            separate_errors,
            dry_run,
            json,
        })?,
        Command::Check { batch } => check::check_batch(&batch)?,
        Command::Init { force } => {
            init::init_project(force)?;
            true
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
