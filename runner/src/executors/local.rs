
use super::{stage_steps, Executor, ExecutorError};
use crate::{
    config::{ProgramConfig, RuntimeConfig},
    launch::{Invocation, LaunchPlan, Step},
    request::{Mode, RunRequest},
};
use std::num::NonZeroU32;

/// Executor for a single machine: one executable, no host file
#[derive(Clone, Debug)]
pub struct LocalExecutor {
    program: ProgramConfig,
    runtime: RuntimeConfig,
}

impl Executor for LocalExecutor {
    fn load(program: &ProgramConfig, runtime: &RuntimeConfig) -> Self {
        Self {
            program: program.clone(),
            runtime: runtime.clone(),
        }
    }

    fn mode(&self) -> Mode {
        Mode::Local
    }

    fn program(&self) -> &ProgramConfig {
        &self.program
    }

    fn artifacts(&self) -> Vec<&str> {
        vec![self.program.local.as_str()]
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
        stage_steps(&mut plan, request.work_dir(), &self.artifacts());

        let mut args = vec![self.runtime.np_flag.clone(), process_count.to_string()];
        args.extend(self.runtime.extra_args.iter().cloned());
        args.push(format!("./{}", self.program.local));
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
