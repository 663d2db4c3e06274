//! Launcher for parallel programs on an offload cluster.
//!
//! For every requested process count a run directory is created, a host file is written (cluster
//! mode only), the pre-built executables are staged and the parallel runtime is invoked.

pub mod allocation;
pub mod config;
pub mod executors;
pub mod launch;
pub mod orchestrator;
pub mod request;

pub use allocation::{allocate, HostAllocation, HostSlot};
pub use config::{LauncherConfig, ProgramConfig, RuntimeConfig, TargetKind};
pub use executors::{Executor, ExecutorError, Executors};
pub use launch::{CancelToken, LaunchLimits, LaunchPlan, Step};
pub use orchestrator::{ExecutionReport, Orchestrator, RunOutcome, RunStatus};
pub use request::{Mode, RequestError, RunRequest};
