//! Execution engine for benchmark tasks.
//!
//! Runs one task under the configured timing instrument. The child's stdout
//! and stderr both go to `.command_outputs/{id}.txt`; the instrument writes its
//! metrics line to `.timing_outputs/{id}.txt`. Supports an optional per-task
//! timeout with SIGTERM, escalating to SIGKILL after a grace period.

use matrixbench_proto::{InstrumentError, TaskRecord, TimingInstrument};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Subdirectory of the output directory holding raw metrics lines.
pub const TIMING_OUTPUT_DIR: &str = ".timing_outputs";

/// Subdirectory of the output directory holding captured process output.
pub const COMMAND_OUTPUT_DIR: &str = ".command_outputs";

/// Time a timed-out child gets to exit after SIGTERM.
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Artifact locations for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Metrics line written by the timing instrument.
    pub timing_output: PathBuf,
    /// Combined stdout/stderr of the benchmarked command.
    pub command_output: PathBuf,
}

impl ArtifactPaths {
    /// Resolves the artifact paths of `task` under `output_dir`.
    pub fn for_task(output_dir: &Path, task: &TaskRecord) -> Self {
        Self {
            timing_output: output_dir.join(TIMING_OUTPUT_DIR).join(&task.filename),
            command_output: output_dir.join(COMMAND_OUTPUT_DIR).join(&task.filename),
        }
    }
}

/// Creates both artifact subdirectories.
pub fn ensure_artifact_dirs(output_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(output_dir.join(TIMING_OUTPUT_DIR))?;
    fs::create_dir_all(output_dir.join(COMMAND_OUTPUT_DIR))?;
    Ok(())
}

/// Result of executing one task.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The exit code, `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    /// Whether the command exited with status 0 within the timeout.
    pub success: bool,
    /// Whether the execution was terminated due to timeout.
    pub timed_out: bool,
    /// Wall time observed by the engine, including instrument overhead.
    pub elapsed: Duration,
}

/// Runs task records as child processes under a timing instrument.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    instrument: Arc<dyn TimingInstrument>,
    timeout: Option<Duration>,
}

impl ExecutionEngine {
    /// Creates an engine with no timeout.
    pub fn new(instrument: Arc<dyn TimingInstrument>) -> Self {
        Self {
            instrument,
            timeout: None,
        }
    }

    /// Sets the per-task timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the instrument in use.
    pub fn instrument(&self) -> &dyn TimingInstrument {
        self.instrument.as_ref()
    }

    /// Executes `task` and waits for it to finish.
    ///
    /// A non-zero exit is logged and reported in the outcome, not returned as
    /// an error. Errors mean the task could not be started at all.
    pub async fn run(
        &self,
        task: &TaskRecord,
        output_dir: &Path,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        ensure_artifact_dirs(output_dir)?;
        let paths = ArtifactPaths::for_task(output_dir, task);

        // A stale metrics line from an earlier attempt must not be reconciled.
        match fs::remove_file(&paths.timing_output) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let stdout = File::create(&paths.command_output)?;
        let stderr = stdout.try_clone()?;

        let mut command = self
            .instrument
            .command(&task.command_with_param, &paths.timing_output)?;
        command.stdin(Stdio::null());
        command.stdout(Stdio::from(stdout));
        command.stderr(Stdio::from(stderr));
        #[cfg(unix)]
        if self.timeout.is_some() {
            // Own process group so the whole tree can be signalled on timeout.
            command.process_group(0);
        }

        debug!(
            task_id = %task.id,
            repetition = task.repetition_id,
            command = %task.command_with_param,
            instrument = self.instrument.name(),
            "Spawning benchmark task"
        );

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            instrument: self.instrument.name().to_string(),
            source,
        })?;

        let (status, timed_out) = match self.timeout {
            Some(duration) => match tokio::time::timeout(duration, child.wait()).await {
                Ok(status) => (status?, false),
                Err(_) => {
                    warn!(
                        task_id = %task.id,
                        timeout_secs = duration.as_secs(),
                        "Task timeout reached, sending SIGTERM"
                    );
                    (Self::terminate_child(&mut child).await?, true)
                }
            },
            None => (child.wait().await?, false),
        };
        let elapsed = start.elapsed();

        if !status.success() && !timed_out {
            warn!(
                task_id = %task.id,
                repetition = task.repetition_id,
                command = %task.command_with_param,
                exit_code = ?status.code(),
                "Benchmark command exited with non-zero status"
            );
        }

        Ok(ExecutionOutcome {
            exit_code: status.code(),
            success: status.success() && !timed_out,
            timed_out,
            elapsed,
        })
    }

    /// Sends SIGTERM to the child's process group and reaps it, escalating to
    /// SIGKILL if it outlives the grace period.
    #[cfg(unix)]
    async fn terminate_child(child: &mut tokio::process::Child) -> io::Result<ExitStatus> {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let pgid = Pid::from_raw(pid as i32);
            debug!(%pgid, "Sending SIGTERM to task process group");
            let _ = killpg(pgid, Signal::SIGTERM);

            if let Ok(status) = tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
                return status;
            }

            warn!(%pgid, "Task ignored SIGTERM, sending SIGKILL");
            let _ = killpg(pgid, Signal::SIGKILL);
        }
        child.kill().await?;
        child.wait().await
    }

    #[cfg(not(unix))]
    async fn terminate_child(child: &mut tokio::process::Child) -> io::Result<ExitStatus> {
        child.kill().await?;
        child.wait().await
    }
}

/// Errors that prevent a task from being executed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error("Failed to launch timing instrument '{instrument}': {source}")]
    Spawn {
        instrument: String,
        source: io::Error,
    },
}
