//! Run summaries.
//!
//! The orchestrator threads a `SummaryBuilder` through its task loop by value
//! and turns it into an immutable `Summary` at the end.

use crate::reconciler::ParseFailure;
use matrixbench_proto::TaskRecord;
use std::fmt;
use std::fs;
use std::path::Path;

/// Captured output kept per failed task.
pub const MAX_CAPTURED_OUTPUT_BYTES: usize = 4096;

/// Why a task ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The command exited with a non-zero status (`None` when killed by a signal).
    NonZeroExit(Option<i32>),
    /// The per-task timeout elapsed.
    TimedOut,
    /// The timing instrument could not be launched.
    InstrumentFailed(String),
    /// The timing artifact was missing, empty or malformed.
    Parse(ParseFailure),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NonZeroExit(Some(code)) => write!(f, "exited with status {code}"),
            FailureReason::NonZeroExit(None) => write!(f, "terminated by signal"),
            FailureReason::TimedOut => write!(f, "timed out"),
            FailureReason::InstrumentFailed(message) => write!(f, "{message}"),
            FailureReason::Parse(failure) => write!(f, "{failure}"),
        }
    }
}

/// Diagnostics for one failed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub id: String,
    pub repetition_id: u32,
    pub command_with_param: String,
    pub reason: FailureReason,
    /// Tail of the captured stdout/stderr, if the command produced any.
    pub output: Option<String>,
}

impl FailedTask {
    /// Builds the diagnostics for `task`, reading its captured output file.
    pub fn new(task: &TaskRecord, reason: FailureReason, command_output: &Path) -> Self {
        Self {
            id: task.id.clone(),
            repetition_id: task.repetition_id,
            command_with_param: task.command_with_param.clone(),
            reason,
            output: read_output_tail(command_output),
        }
    }
}

/// Reads the last `MAX_CAPTURED_OUTPUT_BYTES` of a capture file.
fn read_output_tail(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let start = bytes.len().saturating_sub(MAX_CAPTURED_OUTPUT_BYTES);
    Some(String::from_utf8_lossy(&bytes[start..]).into_owned())
}

/// Outcome of a run or reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedTask>,
}

impl Summary {
    /// True when no task failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code for this summary.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} tasks: {} succeeded, {} failed",
            self.total, self.succeeded, self.failed
        )?;
        for failure in &self.failures {
            writeln!(f)?;
            writeln!(
                f,
                "FAILED [{}] rep {}: {}",
                failure.id, failure.repetition_id, failure.command_with_param
            )?;
            writeln!(f, "  reason: {}", failure.reason)?;
            if let Some(output) = &failure.output {
                writeln!(f, "  output:")?;
                for line in output.lines() {
                    writeln!(f, "    {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Accumulates task outcomes into a `Summary`.
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    summary: Summary,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a succeeded task.
    pub fn succeeded(mut self) -> Self {
        self.summary.total += 1;
        self.summary.succeeded += 1;
        self
    }

    /// Records a failed task.
    pub fn failed(mut self, failure: FailedTask) -> Self {
        self.summary.total += 1;
        self.summary.failed += 1;
        self.summary.failures.push(failure);
        self
    }

    pub fn finish(self) -> Summary {
        self.summary
    }
}
