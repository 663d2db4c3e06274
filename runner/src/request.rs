
use std::{
    fmt,
    num::NonZeroU32,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Unknown mode {0:?}, expected `local` or `cluster`")]
    UnknownMode(String),
    #[error("No process counts given")]
    EmptyProcessCounts,
    #[error("Invalid process count {0:?}, expected a positive integer")]
    InvalidProcessCount(String),
}

/// Execution mode of a run request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// single machine, no host file
    Local,
    /// distributed over the offload cluster
    Cluster,
}

impl FromStr for Mode {
    type Err = RequestError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            // `mvs` is the name of the cluster the launcher was written for
            "cluster" | "mvs" => Ok(Self::Cluster),
            _ => Err(RequestError::UnknownMode(input.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Cluster => f.write_str("cluster"),
        }
    }
}

/// One launcher invocation: a target run once per requested process count
#[derive(Clone, Debug)]
pub struct RunRequest {
    target: String,
    base_dir: PathBuf,
    process_counts: Vec<NonZeroU32>,
    mode: Mode,
    work_dir: PathBuf,
}

impl RunRequest {
    pub fn new(
        target: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        process_counts: Vec<NonZeroU32>,
        mode: Mode,
    ) -> Result<Self, RequestError> {
        if process_counts.is_empty() {
            return Err(RequestError::EmptyProcessCounts);
        }

        Ok(Self {
            target: target.into(),
            base_dir: base_dir.into(),
            process_counts,
            mode,
            work_dir: PathBuf::from("."),
        })
    }

    /// directory the pre-built executables are staged from
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn process_counts(&self) -> &[NonZeroU32] {
        &self.process_counts
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `<base_dir>/run_<pc>` with the count zero padded to three digits
    pub fn run_dir(&self, process_count: NonZeroU32) -> PathBuf {
        self.base_dir.join(format!("run_{:03}", process_count.get()))
    }
}

/// parse process counts from arguments, each argument may hold several whitespace separated counts
pub fn parse_process_counts<S: AsRef<str>>(
    arguments: &[S],
) -> Result<Vec<NonZeroU32>, RequestError> {
    let counts = arguments
        .iter()
        .flat_map(|argument| argument.as_ref().split_whitespace())
        .map(|token| {
            token
                .parse::<u32>()
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| RequestError::InvalidProcessCount(token.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if counts.is_empty() {
        Err(RequestError::EmptyProcessCounts)
    } else {
        Ok(counts)
    }
}
