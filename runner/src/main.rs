#[cfg(test)]
mod main_test;

use clap::{Parser, Subcommand};
use mvs_runner::{
    allocation::{allocate, AllocationError},
    config::{ConfigErrors, LauncherConfig},
    executors::ExecutorError,
    orchestrator::{Orchestrator, RunStatus},
    request::{parse_process_counts, Mode, RequestError, RunRequest},
};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Launch parallel programs locally or on the offload cluster")]
struct Cli {
    /// YAML file with runtime flags and programs, the built-in presets are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program once per process count
    Run {
        /// `local` or `cluster` (`mvs` is accepted as well)
        mode: Mode,
        /// Program name from the config, e.g. `hydro` or `test_mpi`
        program: String,
        /// Test name or grid path handed to the program
        target: String,
        /// Directory collecting the run directories
        dir: PathBuf,
        /// Process counts, a single argument may hold several (`"4 8 16"`)
        #[arg(required = true, num_args = 1..)]
        pcs: Vec<String>,
        /// Directory containing the pre-built executables
        #[arg(short, long, default_value = ".")]
        work_dir: PathBuf,
        /// Stop a launch after this many seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
        /// Seconds between SIGTERM and SIGKILL when stopping a launch
        #[arg(long)]
        grace: Option<u64>,
        /// Print the plans without creating or launching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the host file for a process count
    Hosts {
        pc: u32,
        /// Write the host file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the configured programs
    Programs,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(error) => {
            error!(error = ?error, "{error}");

            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = match cli.config {
        Some(path) => LauncherConfig::load(&path)?,
        None => LauncherConfig::with_presets(),
    };

    match cli.command {
        Commands::Run {
            mode,
            program,
            target,
            dir,
            pcs,
            work_dir,
            timeout,
            grace,
            dry_run,
        } => {
            let program = config.program(&program)?.clone();
            let request = RunRequest::new(target, dir, parse_process_counts(&pcs)?, mode)?
                .with_work_dir(work_dir);

            let mut limits = config.launch_limits();
            if let Some(timeout) = timeout {
                limits.timeout = Some(Duration::from_secs(timeout));
            }
            if let Some(grace) = grace {
                limits.grace = Duration::from_secs(grace);
            }

            let report = Orchestrator::new(program, config.runtime.clone())
                .with_limits(limits)
                .with_dry_run(dry_run)
                .with_audit(|plan| print!("{plan}"))
                .execute(&request)?;

            for outcome in report.outcomes() {
                let status = match &outcome.status {
                    RunStatus::Succeeded => "succeeded".to_string(),
                    RunStatus::Planned => "planned".to_string(),
                    RunStatus::Exited { code: Some(code) } => format!("exited with {code}"),
                    RunStatus::Exited { code: None } => "killed by a signal".to_string(),
                    RunStatus::TimedOut => "timed out".to_string(),
                    RunStatus::Cancelled => "cancelled".to_string(),
                    RunStatus::Failed(error) => format!("failed: {error}"),
                };
                println!("{:>5} processes: {status}", outcome.process_count);
            }

            if report.all_succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Hosts { pc, output } => {
            let allocation = allocate(pc)?;

            match output {
                Some(path) => allocation.write_to(&path)?,
                None => print!("{allocation}"),
            }

            Ok(ExitCode::SUCCESS)
        }

        Commands::Programs => {
            for name in config.program_names() {
                let program = config.program(name)?;
                println!(
                    "{name}: local={} cluster={} offload={} target={:?} max_time={}",
                    program.local, program.cluster, program.offload, program.target, program.max_time
                );
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}
