//! Configuration types for matrixbench runs.
//!
//! A run is described by a `RunConfig`, loaded from YAML and then overridden by
//! command-line flags. `validate` rejects configurations that cannot run at
//! all and returns warnings for combinations that are accepted but ignored.

use crate::identity::IdScheme;
use crate::store::STORE_FILE_NAME;
use crate::sweep::{RangeSweep, Sweep};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Full description of one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Shell command to benchmark. Optional only for retry and reconcile runs.
    #[serde(default)]
    pub command: Option<String>,

    /// Number of repetitions per sweep point.
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    /// Literal parameters, each appended to the command.
    #[serde(default)]
    pub params: Vec<String>,

    /// Numeric range sweep. Mutually exclusive with `params`.
    #[serde(default)]
    pub range: Option<RangeSweep>,

    /// Directory holding the result store and artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Keep records from earlier runs instead of purging the store.
    #[serde(default)]
    pub merge: bool,

    /// Re-run only stored tasks that have no timing result.
    #[serde(default)]
    pub retry_failed: bool,

    /// Per-task timeout in seconds. Unset means wait indefinitely.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// How task ids are derived.
    #[serde(default)]
    pub id_scheme: IdScheme,

    /// Record metrics for commands that exit non-zero instead of failing them.
    #[serde(default)]
    pub allow_nonzero_exit: bool,

    /// Shell used to run the composed command.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// GNU `time` binary used as the timing instrument.
    #[serde(default = "default_time_binary")]
    pub time_binary: String,

    /// Suppress all warnings (for CI environments).
    #[serde(default, rename = "_suppress_warnings")]
    pub suppress_warnings: bool,
}

fn default_repetitions() -> u32 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("benchmark_results")
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_time_binary() -> String {
    "/usr/bin/time".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            command: None,
            repetitions: default_repetitions(),
            params: Vec::new(),
            range: None,
            output_dir: default_output_dir(),
            merge: false,
            retry_failed: false,
            timeout_seconds: None,
            id_scheme: IdScheme::default(),
            allow_nonzero_exit: false,
            shell: default_shell(),
            time_binary: default_time_binary(),
            suppress_warnings: false,
        }
    }
}

impl RunConfig {
    /// Creates a configuration for `command` with defaults for everything else.
    pub fn for_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            command = ?config.command,
            repetitions = config.repetitions,
            output_dir = %config.output_dir.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Returns the trimmed command, if one is set and non-blank.
    pub fn command(&self) -> Option<&str> {
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Resolves the parameter sweep.
    ///
    /// Literal parameters and a range are mutually exclusive; supplying both is
    /// an error rather than a silent choice.
    pub fn sweep(&self) -> Result<Sweep, ConfigError> {
        match (&self.range, self.params.is_empty()) {
            (Some(_), false) => Err(ConfigError::ConflictingSweep),
            (Some(range), true) => {
                if range.step == 0 {
                    return Err(ConfigError::ZeroStep);
                }
                Ok(Sweep::Range(range.clone()))
            }
            (None, false) => Ok(Sweep::Literal(self.params.clone())),
            (None, true) => Ok(Sweep::None),
        }
    }

    /// Per-task timeout, if any. A zero timeout counts as none.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Path of the result store file.
    pub fn store_path(&self) -> PathBuf {
        self.output_dir.join(STORE_FILE_NAME)
    }

    /// Validates the configuration and returns warnings.
    ///
    /// Errors:
    /// - literal parameters and a range both supplied
    /// - no command outside retry-only-failed runs
    /// - zero repetitions or a zero range step
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.sweep()?;

        if !self.retry_failed {
            if self.command().is_none() {
                return Err(ConfigError::MissingCommand);
            }
            if self.repetitions == 0 {
                return Err(ConfigError::ZeroRepetitions);
            }
        }

        let mut warnings = Vec::new();
        if self.suppress_warnings {
            return Ok(warnings);
        }

        if self.retry_failed {
            if self.command().is_some() || !self.params.is_empty() || self.range.is_some() {
                warnings.push(ConfigWarning::IgnoredField {
                    field: "command/params/range".to_string(),
                    reason: "retry_failed re-runs stored tasks only".to_string(),
                });
            }
            if self.merge {
                warnings.push(ConfigWarning::IgnoredField {
                    field: "merge".to_string(),
                    reason: "retry_failed always keeps the existing store".to_string(),
                });
            }
        }

        if self.timeout_seconds == Some(0) {
            warnings.push(ConfigWarning::InvalidValue {
                field: "timeout_seconds".to_string(),
                message: "A timeout of 0 disables the timeout".to_string(),
            });
        }

        if self.shell.trim().is_empty() {
            warnings.push(ConfigWarning::InvalidValue {
                field: "shell".to_string(),
                message: "Empty shell, falling back to 'sh'".to_string(),
            });
        }

        Ok(warnings)
    }

    /// Shell to run commands with.
    pub fn effective_shell(&self) -> &str {
        let shell = self.shell.trim();
        if shell.is_empty() { "sh" } else { shell }
    }
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone)]
pub enum ConfigWarning {
    /// Field is present but has no effect in this mode.
    IgnoredField { field: String, reason: String },
    /// Field has an invalid value that was replaced.
    InvalidValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::IgnoredField { field, reason } => {
                write!(f, "Warning [{}]: Field ignored - {}", field, reason)
            }
            ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Literal parameters and a range sweep are mutually exclusive")]
    ConflictingSweep,

    #[error("A command is required")]
    MissingCommand,

    #[error("Repetitions must be at least 1")]
    ZeroRepetitions,

    #[error("Range step must not be zero")]
    ZeroStep,
}
