//! GNU `time` as a timing instrument.

use async_trait::async_trait;
use matrixbench_core::RunConfig;
use matrixbench_proto::{InstrumentError, TimingInstrument};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Format string producing `wall;user;kernel;max_rss_kb`.
pub const GNU_TIME_FORMAT: &str = "%e;%U;%S;%M";

/// Runs commands as `time -f FORMAT -o FILE SHELL -c COMMAND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnuTimeInstrument {
    /// The `time` binary, a path or a name looked up in `PATH`.
    pub binary: String,
    /// Shell the benchmarked command is handed to.
    pub shell: String,
}

impl GnuTimeInstrument {
    pub fn new(binary: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            shell: shell.into(),
        }
    }

    /// Creates the instrument from the run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.time_binary.trim(), config.effective_shell())
    }

    /// Arguments passed to the `time` binary, in order.
    pub fn args(&self, shell_command: &str, timing_output: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            GNU_TIME_FORMAT.to_string(),
            "-o".to_string(),
            timing_output.display().to_string(),
            self.shell.clone(),
            "-c".to_string(),
            shell_command.to_string(),
        ]
    }
}

impl Default for GnuTimeInstrument {
    fn default() -> Self {
        Self::new("/usr/bin/time", "sh")
    }
}

#[async_trait]
impl TimingInstrument for GnuTimeInstrument {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn probe(&self) -> Result<(), InstrumentError> {
        // BSD time rejects --version, which is what we want: it has no -f.
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| InstrumentError::Unavailable {
                name: self.binary.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            debug!(binary = %self.binary, "GNU time available");
            Ok(())
        } else {
            Err(InstrumentError::Unavailable {
                name: self.binary.clone(),
                reason: format!("'--version' exited with {}", output.status),
            })
        }
    }

    fn command(
        &self,
        shell_command: &str,
        timing_output: &Path,
    ) -> Result<Command, InstrumentError> {
        let mut command = Command::new(&self.binary);
        command.args(self.args(shell_command, timing_output));
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_layout() {
        let instrument = GnuTimeInstrument::new("gtime", "bash");
        let args = instrument.args("sort -n data.txt", Path::new("/out/.timing_outputs/a.txt"));
        assert_eq!(
            args,
            vec![
                "-f",
                "%e;%U;%S;%M",
                "-o",
                "/out/.timing_outputs/a.txt",
                "bash",
                "-c",
                "sort -n data.txt",
            ]
        );
    }

    #[test]
    fn test_from_config() {
        let config = RunConfig {
            time_binary: " gtime ".to_string(),
            shell: String::new(),
            ..RunConfig::for_command("ls")
        };
        let instrument = GnuTimeInstrument::from_config(&config);
        assert_eq!(instrument, GnuTimeInstrument::new("gtime", "sh"));
    }

    #[test]
    fn test_command_program() {
        let instrument = GnuTimeInstrument::default();
        let command = instrument.command("true", Path::new("t.txt")).unwrap();
        assert_eq!(command.as_std().get_program(), "/usr/bin/time");
        assert_eq!(command.as_std().get_args().count(), 7);
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let instrument = GnuTimeInstrument::new("definitely_not_a_real_time_xyz123", "sh");
        let err = instrument.probe().await.unwrap_err();
        assert!(matches!(err, InstrumentError::Unavailable { .. }));
    }
}
