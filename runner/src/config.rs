
use crate::launch::LaunchLimits;
use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {path:?}")]
    ReadConfig { path: PathBuf, source: Error },
    #[error("Config could not be parsed")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks")]
    FailedPreflight,
    #[error("Program {0} is not configured")]
    UnknownProgram(String),
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
}

/// How a program consumes the run target
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// target is handed to the program as its last argument
    #[default]
    Test,
    /// target names a grid, the program reads the descriptors on its own
    Grid,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    // programs from the file take precedence over the built-in presets
    #[serde(default)]
    pub programs: BTreeMap<String, ProgramConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Spelling of the parallel runtime invocation
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default = "default_launcher")]
    pub launcher: String,
    #[serde(default = "default_np_flag")]
    pub np_flag: String,
    #[serde(default = "default_hosts_flag")]
    pub hosts_flag: String,
    #[serde(default = "default_offload_flag")]
    pub offload_flag: String,
    #[serde(default = "default_max_time_flag")]
    pub max_time_flag: String,
    // appended right before the executable in both modes
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProgramConfig {
    /// executable for local runs
    pub local: String,
    /// host side executable for cluster runs
    pub cluster: String,
    /// accelerator side executable staged next to `cluster`
    pub offload: String,
    #[serde(default)]
    pub target: TargetKind,
    /// wall-clock limit handed to the runtime in cluster mode
    #[serde(default = "default_max_time")]
    pub max_time: u32,
    /// extensions of the files that must exist next to a grid target
    #[serde(default = "default_descriptors")]
    pub descriptors: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// seconds until a launch is stopped, unbounded if unset
    pub timeout: Option<u64>,
    /// seconds between SIGTERM and SIGKILL
    #[serde(default = "default_grace")]
    pub grace: u64,
}

static PRESETS: Lazy<BTreeMap<String, ProgramConfig>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "hydro".to_string(),
            ProgramConfig::from_prefix("hydro", TargetKind::Grid, 30),
        ),
        (
            "test_mpi".to_string(),
            ProgramConfig::from_prefix("test_mpi", TargetKind::Test, 180),
        ),
    ])
});

impl ProgramConfig {
    /// build the `<prefix>.local`, `<prefix>.mvs` and `<prefix>.mvs.mic` naming scheme
    pub fn from_prefix(prefix: &str, target: TargetKind, max_time: u32) -> Self {
        Self {
            local: format!("{prefix}.local"),
            cluster: format!("{prefix}.mvs"),
            offload: format!("{prefix}.mvs.mic"),
            target,
            max_time,
            descriptors: default_descriptors(),
        }
    }

    /// the program argument derived from the run target, if the program takes one
    pub fn target_argument<'a>(&self, target: &'a str) -> Option<&'a str> {
        match self.target {
            TargetKind::Test => Some(target),
            TargetKind::Grid => None,
        }
    }

    /// descriptor files required for `target`, empty for test programs
    pub fn descriptor_paths(&self, target: &str) -> Vec<PathBuf> {
        match self.target {
            TargetKind::Test => Vec::new(),
            TargetKind::Grid => self
                .descriptors
                .iter()
                .map(|extension| PathBuf::from(format!("{target}.{extension}")))
                .collect(),
        }
    }
}

impl LauncherConfig {
    /// load a config file, falling back to the built-in presets for unknown programs
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&content)?;

        debug!(path = ?path, programs = config.programs.len(), "Loaded config");
        config.merge_presets();

        if config.preflight_checks() {
            Err(ConfigErrors::FailedPreflight)
        } else {
            Ok(config)
        }
    }

    /// config consisting only of the built-in presets
    pub fn with_presets() -> Self {
        let mut config = Self::default();
        config.merge_presets();
        config
    }

    fn merge_presets(&mut self) {
        for (name, preset) in PRESETS.iter() {
            self.programs
                .entry(name.clone())
                .or_insert_with(|| preset.clone());
        }
    }

    pub fn program(&self, name: &str) -> Result<&ProgramConfig, ConfigErrors> {
        self.programs
            .get(name)
            .ok_or_else(|| ConfigErrors::UnknownProgram(name.to_string()))
    }

    pub fn program_names(&self) -> Vec<&str> {
        self.programs.keys().map(String::as_str).sorted().collect()
    }

    pub fn launch_limits(&self) -> LaunchLimits {
        LaunchLimits {
            timeout: self.limits.timeout.map(Duration::from_secs),
            grace: Duration::from_secs(self.limits.grace),
        }
    }

    /// returns true if the config contains errors, every problem is logged
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.runtime.launcher.trim().is_empty() {
            error!("runtime.launcher must name the parallel runtime launcher");
            contains_error = true;
        }

        for (name, program) in self.programs.iter() {
            for (field, value) in [
                ("local", &program.local),
                ("cluster", &program.cluster),
                ("offload", &program.offload),
            ] {
                if value.trim().is_empty() {
                    error!("programs.{name}.{field} must name an executable");
                    contains_error = true;
                } else if value.contains('/') {
                    error!("programs.{name}.{field} ({value}) must be a file name, not a path");
                    contains_error = true;
                }
            }

            if program.max_time == 0 {
                error!("programs.{name}.max_time cannot be 0");
                contains_error = true;
            }

            match program.target {
                TargetKind::Grid if program.descriptors.is_empty() => {
                    warn!("programs.{name} is a grid program without descriptors, no grid files will be checked");
                }
                TargetKind::Test if program.descriptors != default_descriptors() => {
                    warn!("programs.{name}.descriptors is ignored for test programs");
                }
                _ => {}
            }
        }

        if self.limits.timeout == Some(0) {
            error!("limits.timeout cannot be 0, leave it unset for unbounded launches");
            contains_error = true;
        }

        contains_error
    }
}

impl RuntimeConfig {
    /// anchor a relative launcher path such as `bin/mpirun` at `base`
    ///
    /// The launcher is spawned inside the run directory, a relative path would be looked up
    /// from there. Bare names are left to the `PATH` lookup.
    pub fn anchored_at(&self, base: &Path) -> Self {
        let mut runtime = self.clone();

        if self.launcher.contains('/') && Path::new(&self.launcher).is_relative() {
            runtime.launcher = base.join(&self.launcher).to_string_lossy().into_owned();
            debug!(launcher = %runtime.launcher, "Anchored relative launcher");
        }

        runtime
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            np_flag: default_np_flag(),
            hosts_flag: default_hosts_flag(),
            offload_flag: default_offload_flag(),
            max_time_flag: default_max_time_flag(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            grace: default_grace(),
        }
    }
}

fn default_launcher() -> String {
    "mpirun".to_string()
}

fn default_np_flag() -> String {
    "-np".to_string()
}

fn default_hosts_flag() -> String {
    "-machinefile".to_string()
}

fn default_offload_flag() -> String {
    "-mic".to_string()
}

fn default_max_time_flag() -> String {
    "-maxtime".to_string()
}

fn default_max_time() -> u32 {
    30
}

fn default_descriptors() -> Vec<String> {
    vec!["pfg".to_string(), "ibc".to_string()]
}

fn default_grace() -> u64 {
    10
}
