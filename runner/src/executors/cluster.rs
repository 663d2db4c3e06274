
use super::{stage_steps, Executor, ExecutorError};
use crate::{
    allocation::{allocate, HOSTS_FILE_NAME},
    config::{ProgramConfig, RuntimeConfig},
    launch::{Invocation, LaunchPlan, Step},
    request::{Mode, RunRequest},
};
use std::num::NonZeroU32;
use tracing::debug;

/// Executor for the offload cluster: host file, host and accelerator executables
#[derive(Clone, Debug)]
pub struct ClusterExecutor {
    program: ProgramConfig,
    runtime: RuntimeConfig,
}

impl Executor for ClusterExecutor {
    fn load(program: &ProgramConfig, runtime: &RuntimeConfig) -> Self {
        Self {
            program: program.clone(),
            runtime: runtime.clone(),
        }
    }

    fn mode(&self) -> Mode {
        Mode::Cluster
    }

    fn program(&self) -> &ProgramConfig {
        &self.program
    }

    fn artifacts(&self) -> Vec<&str> {
        vec![self.program.cluster.as_str(), self.program.offload.as_str()]
    }

    fn plan(
        &self,
        request: &RunRequest,
        process_count: NonZeroU32,
    ) -> Result<LaunchPlan, ExecutorError> {
        let mut plan = LaunchPlan::new(process_count, request.run_dir(process_count));
        let run_dir = plan.run_dir.clone();

        plan.push(Step::CreateDir {
            path: run_dir.clone(),
        });

        let allocation = allocate(process_count.get())?;
        debug!(
            process_count = process_count.get(),
            nodes = allocation.len(),
            "Allocated hosts"
        );
        plan.push(Step::WriteHosts {
            path: run_dir.join(HOSTS_FILE_NAME),
            allocation,
        });

        stage_steps(&mut plan, request.work_dir(), &self.artifacts());

        let mut args = vec![
            self.runtime.np_flag.clone(),
            process_count.to_string(),
            self.runtime.hosts_flag.clone(),
            HOSTS_FILE_NAME.to_string(),
            self.runtime.offload_flag.clone(),
            self.runtime.max_time_flag.clone(),
            self.program.max_time.to_string(),
        ];
        args.extend(self.runtime.extra_args.iter().cloned());
        args.push(self.program.cluster.clone());
        args.extend(
            self.program
                .target_argument(request.target())
                .map(str::to_string),
        );

        plan.push(Step::Invoke(Invocation::new(
            &self.runtime.launcher,
            args,
            run_dir,
        )));

        Ok(plan)
    }
}
