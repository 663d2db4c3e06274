use super::{Cli, Commands};
use clap::{error::ErrorKind, Parser};
use mvs_runner::request::Mode;
use std::path::PathBuf;

fn parse<const N: usize>(arguments: [&str; N]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("mvs-runner").chain(arguments))
}

#[test]
pub fn run_accepts_flags_after_process_counts() {
    let cli = parse([
        "run", "local", "test_mpi", "t", "out", "4", "8", "--dry-run", "--timeout", "5",
    ])
    .unwrap();

    match cli.command {
        Commands::Run {
            mode,
            pcs,
            dry_run,
            timeout,
            ..
        } => {
            assert_eq!(mode, Mode::Local);
            assert_eq!(pcs, vec!["4", "8"]);
            assert!(dry_run);
            assert_eq!(timeout, Some(5));
        }
        command => panic!("parsed as {command:?}"),
    }
}

#[test]
pub fn run_keeps_legacy_count_list() {
    let cli = parse([
        "run", "mvs", "hydro", "grids/cube", "out", "4 8 16", "-w", "build",
    ])
    .unwrap();

    match cli.command {
        Commands::Run {
            mode,
            pcs,
            work_dir,
            dry_run,
            timeout,
            ..
        } => {
            assert_eq!(mode, Mode::Cluster);
            assert_eq!(pcs, vec!["4 8 16"]);
            assert_eq!(work_dir, PathBuf::from("build"));
            assert!(!dry_run);
            assert_eq!(timeout, None);
        }
        command => panic!("parsed as {command:?}"),
    }
}

#[test]
pub fn run_rejects_negative_count() {
    assert_eq!(
        parse(["run", "local", "test_mpi", "t", "out", "4", "-3"])
            .unwrap_err()
            .kind(),
        ErrorKind::UnknownArgument
    );
}

#[test]
pub fn run_rejects_zero_timeout() {
    assert_eq!(
        parse(["run", "local", "test_mpi", "t", "out", "4", "--timeout", "0"])
            .unwrap_err()
            .kind(),
        ErrorKind::ValueValidation
    );
    assert!(parse(["run", "local", "test_mpi", "t", "out", "4", "--timeout", "1"]).is_ok());
}

#[test]
pub fn run_rejects_unknown_mode() {
    assert_eq!(
        parse(["run", "both", "test_mpi", "t", "out", "4"])
            .unwrap_err()
            .kind(),
        ErrorKind::ValueValidation
    );
}
