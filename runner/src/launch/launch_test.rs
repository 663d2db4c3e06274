use super::{
    CancelToken, Invocation, LaunchError, LaunchLimits, LaunchPlan, LaunchStatus, Step,
};
use crate::allocation::allocate;
use std::{
    fs,
    num::NonZeroU32,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::ExitStatus,
    thread,
    time::{Duration, Instant},
};

fn shell(script: &str, dir: PathBuf) -> Invocation {
    Invocation::new("sh", vec!["-c".to_string(), script.to_string()], dir)
}

#[test]
pub fn plan_display_lists_every_step() {
    let run_dir = PathBuf::from("out/run_007");
    let mut plan = LaunchPlan::new(NonZeroU32::new(7).unwrap(), run_dir.clone());
    plan.push(Step::CreateDir {
        path: run_dir.clone(),
    });
    plan.push(Step::WriteHosts {
        path: run_dir.join("hosts"),
        allocation: allocate(7).unwrap(),
    });
    plan.push(Step::Stage {
        from: PathBuf::from("./hydro.mvs"),
        to: run_dir.join("hydro.mvs"),
    });
    plan.push(Step::Invoke(Invocation::new(
        "mpirun",
        vec!["-np".to_string(), "7".to_string(), "hydro.mvs".to_string()],
        run_dir,
    )));

    assert_eq!(
        plan.to_string(),
        "Run with 7 processes in \"out/run_007\":\n  \
         mkdir -p out/run_007\n  \
         write out/run_007/hosts (node1:0 node2:5 node3:2)\n  \
         cp ./hydro.mvs out/run_007/hydro.mvs\n  \
         cd out/run_007 && mpirun -np 7 hydro.mvs\n"
    );
    assert_eq!(plan.invocation().unwrap().program, "mpirun");
}

#[test]
pub fn apply_creates_and_reuses_directories() {
    let dir = tempfile::tempdir().unwrap();
    let step = Step::CreateDir {
        path: dir.path().join("out/run_004"),
    };

    step.apply().unwrap();
    fs::write(dir.path().join("out/run_004/keep"), "x").unwrap();
    step.apply().unwrap();

    assert!(dir.path().join("out/run_004/keep").exists());
}

#[test]
pub fn apply_stage_reports_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let step = Step::Stage {
        from: dir.path().join("missing"),
        to: dir.path().join("copy"),
    };

    assert!(matches!(step.apply(), Err(LaunchError::Stage { .. })));
}

#[test]
pub fn run_reports_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let status = shell("pwd > where; exit 3", dir.path().to_path_buf())
        .run(&LaunchLimits::default(), None)
        .unwrap();

    assert_eq!(status, LaunchStatus::Exited(ExitStatus::from_raw(3 << 8)));
    assert_eq!(
        PathBuf::from(fs::read_to_string(dir.path().join("where")).unwrap().trim())
            .canonicalize()
            .unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[test]
pub fn run_missing_program_fails_to_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let invocation = Invocation::new(
        "/nonexistent/mpirun",
        Vec::new(),
        dir.path().to_path_buf(),
    );

    assert!(matches!(
        invocation.run(&LaunchLimits::default(), None),
        Err(LaunchError::Spawn { .. })
    ));
}

#[test]
pub fn run_stops_at_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let limits = LaunchLimits {
        timeout: Some(Duration::from_millis(200)),
        grace: Duration::from_secs(2),
    };
    let start = Instant::now();

    let status = shell("exec sleep 30", dir.path().to_path_buf())
        .run(&limits, None)
        .unwrap();

    assert_eq!(status, LaunchStatus::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
pub fn run_timeout_not_hit_by_fast_program() {
    let dir = tempfile::tempdir().unwrap();
    let limits = LaunchLimits {
        timeout: Some(Duration::from_secs(30)),
        grace: Duration::from_secs(1),
    };

    let status = shell("exit 0", dir.path().to_path_buf())
        .run(&limits, None)
        .unwrap();

    assert!(matches!(status, LaunchStatus::Exited(status) if status.success()));
}

#[test]
pub fn run_stops_when_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancelToken::new();
    let canceller = token.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        canceller.cancel();
    });

    let status = shell("exec sleep 30", dir.path().to_path_buf())
        .run(&LaunchLimits::default(), Some(&token))
        .unwrap();
    handle.join().unwrap();

    assert_eq!(status, LaunchStatus::Cancelled);
}
