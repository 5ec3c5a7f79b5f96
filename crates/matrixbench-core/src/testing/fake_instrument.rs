//! Fake timing instruments.
//!
//! `FakeInstrument` runs the benchmarked command through the shell for real,
//! so captured output and exit codes behave normally, but writes a fixed
//! metrics line instead of measuring anything. `MissingInstrument` points at a
//! program that does not exist, for exercising launch failures.
//!
//! # Example
//!
//! ```
//! use matrixbench_core::testing::FakeInstrument;
//!
//! let instrument = FakeInstrument::with_line("1.0;0.5;0.25;2048");
//! assert!(instrument.invocations().is_empty());
//! ```

use async_trait::async_trait;
use matrixbench_proto::{InstrumentError, TimingInstrument};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

/// What the fake writes to the timing output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeMetrics {
    /// Write this line (a trailing newline is added).
    Line(String),
    /// Leave the timing output file untouched.
    Nothing,
}

/// A timing instrument that reports canned metrics.
#[derive(Debug, Clone)]
pub struct FakeInstrument {
    shell: String,
    metrics: FakeMetrics,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl FakeInstrument {
    /// Metrics line written by [`FakeInstrument::new`].
    pub const DEFAULT_LINE: &'static str = "0.01;0.00;0.00;1024";

    /// Creates a fake that reports [`Self::DEFAULT_LINE`].
    pub fn new() -> Self {
        Self::with_line(Self::DEFAULT_LINE)
    }

    /// Creates a fake that writes `line` verbatim.
    pub fn with_line(line: impl Into<String>) -> Self {
        Self::with_metrics(FakeMetrics::Line(line.into()))
    }

    /// Creates a fake that never produces a timing artifact.
    pub fn silent() -> Self {
        Self::with_metrics(FakeMetrics::Nothing)
    }

    fn with_metrics(metrics: FakeMetrics) -> Self {
        Self {
            shell: "sh".to_string(),
            metrics,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Commands passed to the instrument, in order. Shared between clones.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Default for FakeInstrument {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimingInstrument for FakeInstrument {
    fn name(&self) -> &str {
        "fake"
    }

    async fn probe(&self) -> Result<(), InstrumentError> {
        Ok(())
    }

    fn command(
        &self,
        shell_command: &str,
        timing_output: &Path,
    ) -> Result<Command, InstrumentError> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(shell_command.to_string());
        }

        if let FakeMetrics::Line(line) = &self.metrics {
            std::fs::write(timing_output, format!("{line}\n"))?;
        }

        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(shell_command);
        Ok(command)
    }
}

/// A timing instrument whose binary is never installed.
#[derive(Debug, Clone)]
pub struct MissingInstrument {
    program: String,
}

impl Default for MissingInstrument {
    fn default() -> Self {
        Self {
            program: "/nonexistent/matrixbench-time".to_string(),
        }
    }
}

#[async_trait]
impl TimingInstrument for MissingInstrument {
    fn name(&self) -> &str {
        &self.program
    }

    async fn probe(&self) -> Result<(), InstrumentError> {
        Err(InstrumentError::Unavailable {
            name: self.program.clone(),
            reason: "not installed".to_string(),
        })
    }

    fn command(
        &self,
        shell_command: &str,
        _timing_output: &Path,
    ) -> Result<Command, InstrumentError> {
        let mut command = Command::new(&self.program);
        command.arg(shell_command);
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fake_writes_metrics_and_records_invocation() {
        let dir = TempDir::new().unwrap();
        let timing = dir.path().join("t.txt");
        let fake = FakeInstrument::with_line("1;2;3;4");

        let mut command = fake.command("echo hi", &timing).unwrap();
        let status = command.status().await.unwrap();

        assert!(status.success());
        assert_eq!(std::fs::read_to_string(&timing).unwrap(), "1;2;3;4\n");
        assert_eq!(fake.invocations(), vec!["echo hi".to_string()]);
        assert!(fake.probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_silent_fake_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let timing = dir.path().join("t.txt");

        let _ = FakeInstrument::silent().command("true", &timing).unwrap();

        assert!(!timing.exists());
    }

    #[tokio::test]
    async fn test_missing_instrument_probe_fails() {
        let missing = MissingInstrument::default();
        let err = missing.probe().await.unwrap_err();
        assert!(matches!(err, InstrumentError::Unavailable { .. }));
    }
}
