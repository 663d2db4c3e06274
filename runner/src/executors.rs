mod cluster;
mod local;

pub use cluster::ClusterExecutor;
pub use local::LocalExecutor;

use crate::{
    allocation::AllocationError,
    config::{check_executable, ConfigErrors, ProgramConfig, RuntimeConfig},
    launch::{LaunchPlan, Step},
    request::{Mode, RunRequest},
};
use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error};

/// Precondition failures, raised before anything is created or launched
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Executable {0:?} not found, build it before launching")]
    MissingExecutable(PathBuf),
    #[error("File {0:?} is not executable")]
    NotExecutable(PathBuf),
    #[error("Target descriptor {0:?} not found")]
    MissingDescriptor(PathBuf),
    #[error("Failed to inspect executable")]
    Inspect(#[from] ConfigErrors),
    #[error("Failed to create base directory {path:?}")]
    CreateBaseDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read the current directory")]
    CurrentDir(#[source] std::io::Error),
    #[error("Failed to allocate hosts")]
    Allocation(#[from] AllocationError),
}

/// Mode specific part of a launch
pub trait Executor {
    fn load(program: &ProgramConfig, runtime: &RuntimeConfig) -> Self
    where
        Self: Sized;

    fn mode(&self) -> Mode;

    fn program(&self) -> &ProgramConfig;

    /// executables staged into every run directory, the first one is launched
    fn artifacts(&self) -> Vec<&str>;

    /// build the steps for a single process count
    fn plan(
        &self,
        request: &RunRequest,
        process_count: NonZeroU32,
    ) -> Result<LaunchPlan, ExecutorError>;

    /// check every artifact and target descriptor without touching the filesystem
    fn preflight(&self, request: &RunRequest) -> Result<(), ExecutorError> {
        for name in self.artifacts() {
            let path = request.work_dir().join(name);

            match check_executable(&path) {
                Ok(true) => debug!(path = ?path, "Found executable"),
                Ok(false) => return Err(ExecutorError::NotExecutable(path)),
                Err(ConfigErrors::FileNotFound) => {
                    error!(path = ?path, mode = %self.mode(), "Executable is missing");

                    return Err(ExecutorError::MissingExecutable(path));
                }
                Err(error) => return Err(error.into()),
            }
        }

        for path in self.program().descriptor_paths(request.target()) {
            if !path.is_file() {
                error!(path = ?path, "Target descriptor is missing");

                return Err(ExecutorError::MissingDescriptor(path));
            }
        }

        Ok(())
    }
}

/// copy every artifact from `work_dir` into the run directory
fn stage_steps(plan: &mut LaunchPlan, work_dir: &Path, artifacts: &[&str]) {
    for name in artifacts {
        let to = plan.run_dir.join(name);

        plan.push(Step::Stage {
            from: work_dir.join(name),
            to,
        });
    }
}

#[derive(Clone, Debug)]
pub enum Executors {
    Local(LocalExecutor),
    Cluster(ClusterExecutor),
}

impl Executors {
    pub fn load(mode: Mode, program: &ProgramConfig, runtime: &RuntimeConfig) -> Self {
        match mode {
            Mode::Local => Self::Local(LocalExecutor::load(program, runtime)),
            Mode::Cluster => Self::Cluster(ClusterExecutor::load(program, runtime)),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Local(executor) => executor.mode(),
            Self::Cluster(executor) => executor.mode(),
        }
    }

    pub fn preflight(&self, request: &RunRequest) -> Result<(), ExecutorError> {
        match self {
            Self::Local(executor) => executor.preflight(request),
            Self::Cluster(executor) => executor.preflight(request),
        }
    }

    pub fn plan(
        &self,
        request: &RunRequest,
        process_count: NonZeroU32,
    ) -> Result<LaunchPlan, ExecutorError> {
        match self {
            Self::Local(executor) => executor.plan(request, process_count),
            Self::Cluster(executor) => executor.plan(request, process_count),
        }
    }
}
