use crate::{
    config::{ProgramConfig, RuntimeConfig},
    executors::{ExecutorError, Executors},
    launch::{CancelToken, LaunchError, LaunchLimits, LaunchPlan, LaunchStatus},
    request::RunRequest,
};
use std::{env, fs, num::NonZeroU32, path::PathBuf};
use tracing::{error, info, instrument, warn};

/// Result of launching a single process count
#[derive(Debug)]
pub enum RunStatus {
    /// runtime exited with status 0
    Succeeded,
    /// runtime exited with a non-zero status or was killed by a signal
    Exited { code: Option<i32> },
    TimedOut,
    Cancelled,
    /// planned only, nothing was created or launched
    Planned,
    /// a step before or during the launch failed
    Failed(LaunchError),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub process_count: NonZeroU32,
    pub run_dir: PathBuf,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded | RunStatus::Planned)
    }
}

/// Outcomes of one request, in the order of its process counts
#[derive(Debug, Default)]
pub struct ExecutionReport {
    outcomes: Vec<RunOutcome>,
}

impl ExecutionReport {
    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(RunOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }
}

impl IntoIterator for ExecutionReport {
    type Item = RunOutcome;
    type IntoIter = std::vec::IntoIter<RunOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// Runs a request once per process count, strictly one after another
pub struct Orchestrator<'a> {
    program: ProgramConfig,
    runtime: RuntimeConfig,
    limits: LaunchLimits,
    cancel: Option<CancelToken>,
    dry_run: bool,
    audit: Box<dyn FnMut(&LaunchPlan) + 'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(program: ProgramConfig, runtime: RuntimeConfig) -> Self {
        Self {
            program,
            runtime,
            limits: LaunchLimits::default(),
            cancel: None,
            dry_run: false,
            audit: Box::new(|plan: &LaunchPlan| {
                for step in plan.steps.iter() {
                    info!(process_count = plan.process_count.get(), "{step}");
                }
            }),
        }
    }

    pub fn with_limits(mut self, limits: LaunchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// only report the plans, nothing is created or launched
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// receives every plan right before it is executed
    pub fn with_audit(mut self, audit: impl FnMut(&LaunchPlan) + 'a) -> Self {
        self.audit = Box::new(audit);
        self
    }

    /// run every process count of `request`
    ///
    /// Precondition failures are returned before anything is created. Failures of a single
    /// process count end up in its outcome and never stop the remaining ones.
    #[instrument(skip_all, fields(mode = %request.mode(), target = %request.target()))]
    pub fn execute(&mut self, request: &RunRequest) -> Result<ExecutionReport, ExecutorError> {
        let cwd = env::current_dir().map_err(ExecutorError::CurrentDir)?;
        let runtime = self.runtime.anchored_at(&cwd);
        let executor = Executors::load(request.mode(), &self.program, &runtime);
        executor.preflight(request)?;

        info!(
            "Run {:?} in directory {:?} with {:?} processes",
            request.target(),
            request.base_dir(),
            request
                .process_counts()
                .iter()
                .map(|pc| pc.get())
                .collect::<Vec<_>>()
        );

        if self.dry_run {
            let mut report = ExecutionReport::default();

            for &process_count in request.process_counts() {
                let plan = executor.plan(request, process_count)?;
                (self.audit)(&plan);

                report.outcomes.push(RunOutcome {
                    process_count,
                    run_dir: plan.run_dir,
                    status: RunStatus::Planned,
                });
            }

            return Ok(report);
        }

        if !request.base_dir().is_dir() {
            fs::create_dir_all(request.base_dir()).map_err(|source| {
                ExecutorError::CreateBaseDir {
                    path: request.base_dir().to_path_buf(),
                    source,
                }
            })?;
            info!(path = ?request.base_dir(), "Directory created");
        }

        let mut report = ExecutionReport::default();

        for &process_count in request.process_counts() {
            if self.is_cancelled() {
                report.outcomes.push(RunOutcome {
                    process_count,
                    run_dir: request.run_dir(process_count),
                    status: RunStatus::Cancelled,
                });

                continue;
            }

            let plan = executor.plan(request, process_count)?;
            (self.audit)(&plan);

            let status = self.run_plan(&plan);
            match &status {
                RunStatus::Succeeded => info!(process_count = process_count.get(), "Launch finished"),
                RunStatus::Failed(error) => {
                    error!(process_count = process_count.get(), error = ?error, "Launch failed: {error}")
                }
                status => warn!(process_count = process_count.get(), status = ?status, "Launch did not succeed"),
            }

            report.outcomes.push(RunOutcome {
                process_count,
                run_dir: plan.run_dir,
                status,
            });
        }

        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, CancelToken::is_cancelled)
    }

    fn run_plan(&self, plan: &LaunchPlan) -> RunStatus {
        for step in plan.steps.iter() {
            if let Err(error) = step.apply() {
                return RunStatus::Failed(error);
            }
        }

        match plan.invocation() {
            Some(invocation) => match invocation.run(&self.limits, self.cancel.as_ref()) {
                Ok(status) => status.into(),
                Err(error) => RunStatus::Failed(error),
            },
            None => RunStatus::Planned,
        }
    }
}

impl From<LaunchStatus> for RunStatus {
    fn from(status: LaunchStatus) -> Self {
        match status {
            LaunchStatus::Exited(status) if status.success() => Self::Succeeded,
            LaunchStatus::Exited(status) => Self::Exited {
                code: status.code(),
            },
            LaunchStatus::TimedOut => Self::TimedOut,
            LaunchStatus::Cancelled => Self::Cancelled,
        }
    }
}
