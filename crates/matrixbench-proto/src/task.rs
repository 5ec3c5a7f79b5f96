//! Task records and timing metrics.
//!
//! A `TaskRecord` is both the unit of work and the unit of persistence: one
//! (command, parameter, repetition) triple together with the metrics captured
//! the last time it ran successfully.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured metrics captured by the timing instrument for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingResult {
    /// Elapsed wall-clock time in seconds.
    pub wall_time_secs: f64,

    /// CPU time spent in user mode, in seconds.
    pub cpu_user_time_secs: f64,

    /// CPU time spent in kernel mode, in seconds.
    pub cpu_kernel_time_secs: f64,

    /// Peak resident set size in kilobytes.
    pub resident_set_memory_kb: u64,
}

impl TimingResult {
    /// Total CPU time (user + kernel) in seconds.
    pub fn cpu_total_secs(&self) -> f64 {
        self.cpu_user_time_secs + self.cpu_kernel_time_secs
    }
}

/// One benchmark task and its persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Identifier shared by every repetition of the same (command, parameter) pair.
    pub group_id: String,

    /// Content-derived identifier. Primary key in the result store and the
    /// base name of every artifact written for this task.
    pub id: String,

    /// When the task was generated.
    pub created_at: DateTime<Utc>,

    /// Artifact file name, always `{id}.txt`.
    pub filename: String,

    /// Base command, trimmed.
    pub command: String,

    /// Parameter applied for this task, `None` for parameterless sweeps.
    pub param: Option<String>,

    /// The literal string handed to the shell.
    pub command_with_param: String,

    /// Zero-based index within the group.
    pub repetition_id: u32,

    /// Metrics from the latest successful execution, absent until then.
    #[serde(default)]
    pub timing_result: Option<TimingResult>,
}

impl TaskRecord {
    /// Creates a pending task record stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        group_id: impl Into<String>,
        command: impl Into<String>,
        param: Option<String>,
        command_with_param: impl Into<String>,
        repetition_id: u32,
    ) -> Self {
        let id = id.into();
        let filename = Self::artifact_name(&id);
        Self {
            group_id: group_id.into(),
            id,
            created_at: Utc::now(),
            filename,
            command: command.into(),
            param,
            command_with_param: command_with_param.into(),
            repetition_id,
            timing_result: None,
        }
    }

    /// Returns the artifact file name for a task id.
    pub fn artifact_name(id: &str) -> String {
        format!("{id}.txt")
    }

    /// Returns true once metrics have been attached.
    pub fn has_result(&self) -> bool {
        self.timing_result.is_some()
    }

    /// State of a stored record that is not currently being run.
    pub fn state(&self) -> TaskState {
        if self.has_result() {
            TaskState::Succeeded
        } else {
            TaskState::Pending
        }
    }
}

/// Lifecycle of a task within one orchestrator run.
///
/// `Pending → Running → {Succeeded, Failed}`. A failed task only returns to
/// `Pending` through a retry-only-failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(label)
    }
}
