//! Typed launch steps and their execution.
//!
//! A `LaunchPlan` replaces the legacy `cd dir ; cp ... ; mpirun ...` shell string: every step is
//! executed on its own and reports its own error. The runtime invocation gets the run directory as
//! its working directory instead of relying on a `cd` persisting inside a shell.

#[cfg(test)]
mod launch_test;

use crate::allocation::{AllocationError, HostAllocation};
use itertools::Itertools;
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use std::{
    fmt, fs, io,
    num::NonZeroU32,
    path::PathBuf,
    process::{Child, Command, ExitStatus},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

/// upper bound for a single wait while a timeout or cancel token is armed
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to create run directory {path:?}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to write host file {path:?}")]
    WriteHosts {
        path: PathBuf,
        source: AllocationError,
    },
    #[error("Failed to stage {from:?} into {to:?}")]
    Stage {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Failed to spawn {program}")]
    Spawn { program: String, source: io::Error },
    #[error("Failed to wait for the parallel runtime")]
    Wait(#[source] io::Error),
    #[error("Failed to stop the parallel runtime")]
    Terminate(#[source] io::Error),
}

/// Opt-in bounds for a single launch, the default blocks until the runtime exits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchLimits {
    pub timeout: Option<Duration>,
    /// time between SIGTERM and SIGKILL when a launch is stopped
    pub grace: Duration,
}

impl Default for LaunchLimits {
    fn default() -> Self {
        Self {
            timeout: None,
            grace: Duration::from_secs(10),
        }
    }
}

/// Shared flag to stop the running launch and skip the remaining ones
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a runtime invocation ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchStatus {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// The parallel runtime call of a plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, current_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir,
        }
    }

    /// run the invocation, bounded by `limits` and `cancel` when given
    #[instrument(skip_all, fields(program = %self.program, dir = ?self.current_dir))]
    pub fn run(
        &self,
        limits: &LaunchLimits,
        cancel: Option<&CancelToken>,
    ) -> Result<LaunchStatus, LaunchError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.current_dir)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        debug!(pid = child.id(), "Spawned parallel runtime");

        if limits.timeout.is_none() && cancel.is_none() {
            let status = child.wait().map_err(LaunchError::Wait)?;

            return Ok(LaunchStatus::Exited(status));
        }

        let start = Instant::now();

        loop {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                info!("Launch cancelled, stopping parallel runtime");
                terminate(&mut child, limits.grace)?;

                return Ok(LaunchStatus::Cancelled);
            }

            let slice = match limits.timeout {
                Some(timeout) => match timeout.checked_sub(start.elapsed()) {
                    Some(left) if !left.is_zero() => left.min(POLL_INTERVAL),
                    _ => {
                        warn!(
                            timeout_secs = timeout.as_secs_f64(),
                            "Parallel runtime ran into timeout, stopping it"
                        );
                        terminate(&mut child, limits.grace)?;

                        return Ok(LaunchStatus::TimedOut);
                    }
                },
                None => POLL_INTERVAL,
            };

            if let Some(status) = child.wait_timeout(slice).map_err(LaunchError::Wait)? {
                return Ok(LaunchStatus::Exited(status));
            }
        }
    }
}

/// SIGTERM first so the runtime can tear down its ranks, SIGKILL after `grace`
fn terminate(child: &mut Child, grace: Duration) -> Result<(), LaunchError> {
    let pid = Pid::from_raw(child.id() as i32);

    match kill(pid, Signal::SIGTERM) {
        Ok(()) => debug!(pid = %pid, "Sent SIGTERM"),
        Err(errno) => warn!(pid = %pid, errno = ?errno, "Failed to send SIGTERM"),
    }

    if child
        .wait_timeout(grace)
        .map_err(LaunchError::Terminate)?
        .is_none()
    {
        warn!(pid = %pid, "Parallel runtime ignored SIGTERM, killing it");
        child.kill().map_err(LaunchError::Terminate)?;
        child.wait().map_err(LaunchError::Terminate)?;
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    CreateDir {
        path: PathBuf,
    },
    WriteHosts {
        path: PathBuf,
        allocation: HostAllocation,
    },
    Stage {
        from: PathBuf,
        to: PathBuf,
    },
    Invoke(Invocation),
}

impl Step {
    /// apply a filesystem step, invocations are left to `Invocation::run`
    pub fn apply(&self) -> Result<(), LaunchError> {
        match self {
            Self::CreateDir { path } => {
                if path.is_dir() {
                    debug!(path = ?path, "Reusing run directory");
                } else {
                    fs::create_dir_all(path).map_err(|source| LaunchError::CreateDir {
                        path: path.clone(),
                        source,
                    })?;
                    info!(path = ?path, "Run directory created");
                }
            }
            Self::WriteHosts { path, allocation } => {
                allocation
                    .write_to(path)
                    .map_err(|source| LaunchError::WriteHosts {
                        path: path.clone(),
                        source,
                    })?;
                info!(path = ?path, "Host file created");
            }
            Self::Stage { from, to } => {
                // fs::copy keeps the permission bits, the copy stays executable
                fs::copy(from, to).map_err(|source| LaunchError::Stage {
                    from: from.clone(),
                    to: to.clone(),
                    source,
                })?;
                debug!(from = ?from, to = ?to, "Staged artifact");
            }
            Self::Invoke(_) => {}
        }

        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir { path } => write!(f, "mkdir -p {}", path.display()),
            Self::WriteHosts { path, allocation } => write!(
                f,
                "write {} ({})",
                path.display(),
                allocation.entries().iter().join(" ")
            ),
            Self::Stage { from, to } => write!(f, "cp {} {}", from.display(), to.display()),
            Self::Invoke(invocation) => write!(
                f,
                "cd {} && {} {}",
                invocation.current_dir.display(),
                invocation.program,
                invocation.args.iter().join(" ")
            ),
        }
    }
}

/// All steps needed to launch one process count
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchPlan {
    pub process_count: NonZeroU32,
    pub run_dir: PathBuf,
    pub steps: Vec<Step>,
}

impl LaunchPlan {
    pub fn new(process_count: NonZeroU32, run_dir: PathBuf) -> Self {
        Self {
            process_count,
            run_dir,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        self.steps.iter().find_map(|step| match step {
            Step::Invoke(invocation) => Some(invocation),
            _ => None,
        })
    }
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run with {} processes in {:?}:",
            self.process_count,
            self.run_dir
        )?;
        self.steps
            .iter()
            .try_for_each(|step| writeln!(f, "  {step}"))
    }
}
