//! Result reconciliation.
//!
//! Reads the metrics line a timing instrument left in
//! `.timing_outputs/{id}.txt`, parses it into a [`TimingResult`] and writes it
//! into the task's store record. Parse problems are per-task failures and
//! leave the record untouched; store errors are fatal.
//!
//! GNU `time` prefixes the metrics line with a status notice when the command
//! failed. Such an artifact only counts as a result when non-zero exits are
//! allowed, matching how the orchestrator treats the exit status of a run.

use crate::executor::ArtifactPaths;
use crate::store::{ResultStore, StoreError};
use matrixbench_proto::{TaskRecord, TimingResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Number of `;`-separated fields in a metrics line.
const FIELD_COUNT: usize = 4;

/// Prefixes of status notices GNU `time` writes ahead of the formatted line.
const STATUS_NOTICE_PREFIXES: &[&str] = &[
    "Command exited with non-zero status",
    "Command terminated by signal",
];

/// Why a timing artifact could not be turned into metrics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("No timing output at {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Timing output at {} is empty", path.display())]
    EmptyArtifact { path: PathBuf },

    #[error("Could not read timing output at {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("Unexpected timing output format: '{line}' ({detail})")]
    UnexpectedFormat { line: String, detail: String },

    #[error("Timing output reports a failed command: {notice}")]
    CommandFailed { notice: String },
}

/// Errors raised while reconciling a task.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The artifact was missing or malformed. The task failed; the run goes on.
    #[error(transparent)]
    Parse(#[from] ParseFailure),

    /// The store could not be written. The run must stop.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parses one `wall;user;kernel;max_rss_kb` line.
pub fn parse_timing_line(line: &str) -> Result<TimingResult, ParseFailure> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseFailure::UnexpectedFormat {
            line: line.to_string(),
            detail: format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
        });
    }

    let seconds = |index: usize, name: &str| -> Result<f64, ParseFailure> {
        let raw = fields[index];
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
            _ => Err(ParseFailure::UnexpectedFormat {
                line: line.to_string(),
                detail: format!("{name} '{raw}' is not a non-negative number"),
            }),
        }
    };

    let wall_time_secs = seconds(0, "wall time")?;
    let cpu_user_time_secs = seconds(1, "user time")?;
    let cpu_kernel_time_secs = seconds(2, "kernel time")?;
    let resident_set_memory_kb = fields[3].parse::<u64>().map_err(|e| {
        ParseFailure::UnexpectedFormat {
            line: line.to_string(),
            detail: format!("max RSS '{}': {e}", fields[3]),
        }
    })?;

    Ok(TimingResult {
        wall_time_secs,
        cpu_user_time_secs,
        cpu_kernel_time_secs,
        resident_set_memory_kb,
    })
}

/// Parses the content of a timing artifact.
///
/// Blank lines are skipped. A GNU `time` status notice fails the parse with
/// `ParseFailure::CommandFailed` unless `allow_nonzero_exit` is set, in which
/// case it is skipped and the next line is parsed.
pub fn parse_timing_output(
    content: &str,
    path: &Path,
    allow_nonzero_exit: bool,
) -> Result<TimingResult, ParseFailure> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    let Some(first) = lines.next() else {
        return Err(ParseFailure::EmptyArtifact {
            path: path.to_path_buf(),
        });
    };

    let mut line = first;
    while is_status_notice(line) {
        if !allow_nonzero_exit {
            return Err(ParseFailure::CommandFailed {
                notice: line.to_string(),
            });
        }
        line = match lines.next() {
            Some(next) => next,
            None => {
                return Err(ParseFailure::UnexpectedFormat {
                    line: first.to_string(),
                    detail: "no metrics line after status notice".to_string(),
                });
            }
        };
    }
    parse_timing_line(line)
}

fn is_status_notice(line: &str) -> bool {
    STATUS_NOTICE_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Attaches parsed timing artifacts to stored task records.
#[derive(Debug, Clone)]
pub struct Reconciler {
    output_dir: PathBuf,
    allow_nonzero_exit: bool,
}

impl Reconciler {
    /// Creates a reconciler reading artifacts under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            allow_nonzero_exit: false,
        }
    }

    /// Accepts metrics of commands that exited non-zero.
    pub fn with_allow_nonzero_exit(mut self, allow: bool) -> Self {
        self.allow_nonzero_exit = allow;
        self
    }

    /// Reads and parses the timing artifact of `task` without touching the store.
    pub fn read_timing(&self, task: &TaskRecord) -> Result<TimingResult, ParseFailure> {
        let path = ArtifactPaths::for_task(&self.output_dir, task).timing_output;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ParseFailure::MissingArtifact { path });
            }
            Err(e) => {
                return Err(ParseFailure::Unreadable {
                    path,
                    message: e.to_string(),
                });
            }
        };
        parse_timing_output(&content, &path, self.allow_nonzero_exit)
    }

    /// Parses the artifact of `task` and persists the result on success.
    ///
    /// On a parse failure a warning naming the task is logged and the stored
    /// record is left as it is. Reconciling the same artifact twice yields the
    /// same result.
    pub fn reconcile(
        &self,
        store: &mut ResultStore,
        task: &TaskRecord,
    ) -> Result<TimingResult, ReconcileError> {
        let timing = match self.read_timing(task) {
            Ok(timing) => timing,
            Err(failure) => {
                match &failure {
                    ParseFailure::UnexpectedFormat { .. } => warn!(
                        task_id = %task.id,
                        repetition = task.repetition_id,
                        command = %task.command_with_param,
                        error = %failure,
                        "Unexpected timing output format"
                    ),
                    ParseFailure::CommandFailed { .. } => warn!(
                        task_id = %task.id,
                        repetition = task.repetition_id,
                        command = %task.command_with_param,
                        error = %failure,
                        "Timing output belongs to a failed command"
                    ),
                    _ => warn!(
                        task_id = %task.id,
                        repetition = task.repetition_id,
                        command = %task.command_with_param,
                        error = %failure,
                        "No timing output for task"
                    ),
                }
                return Err(failure.into());
            }
        };

        let mut record = store.get(&task.id).cloned().unwrap_or_else(|| task.clone());
        record.timing_result = Some(timing);
        store.update(&record)?;

        debug!(
            task_id = %task.id,
            wall_time_secs = timing.wall_time_secs,
            cpu_total_secs = timing.cpu_total_secs(),
            max_rss_kb = timing.resident_set_memory_kb,
            "Reconciled timing output"
        );
        Ok(timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ensure_artifact_dirs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ResultStore, TaskRecord) {
        let dir = TempDir::new().unwrap();
        ensure_artifact_dirs(dir.path()).unwrap();
        let mut store = ResultStore::open_in(dir.path(), false).unwrap();
        let task = TaskRecord::new("t1", "g", "echo", Some("x".to_string()), "echo x", 0);
        store.insert(task.clone()).unwrap();
        (dir, store, task)
    }

    fn write_artifact(dir: &Path, task: &TaskRecord, content: &str) {
        let path = ArtifactPaths::for_task(dir, task).timing_output;
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_valid_line() {
        let timing = parse_timing_line("1.25;0.75;0.10;20480").unwrap();
        assert!((timing.wall_time_secs - 1.25).abs() < f64::EPSILON);
        assert!((timing.cpu_user_time_secs - 0.75).abs() < f64::EPSILON);
        assert!((timing.cpu_kernel_time_secs - 0.10).abs() < f64::EPSILON);
        assert_eq!(timing.resident_set_memory_kb, 20480);
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let timing = parse_timing_line("  0.5 ; 0.1;0.0 ; 12 \n").unwrap();
        assert_eq!(timing.resident_set_memory_kb, 12);
    }

    #[test]
    fn test_parse_two_fields_fails() {
        let err = parse_timing_line("1.2;3.4").unwrap_err();
        assert!(
            matches!(&err, ParseFailure::UnexpectedFormat { detail, .. } if detail.contains("found 2")),
            "got {err:?}"
        );
    }

    #[test]
    fn test_parse_bad_numbers_fail() {
        assert!(parse_timing_line("abc;0.1;0.1;10").is_err());
        assert!(parse_timing_line("0.1;0.1;0.1;1.5").is_err());
        assert!(parse_timing_line("0.1;-0.1;0.1;10").is_err());
        assert!(parse_timing_line("NaN;0.1;0.1;10").is_err());
        assert!(parse_timing_line("0.1;0.1;0.1;10;extra").is_err());
    }

    #[test]
    fn test_parse_output_skips_status_notice_when_allowed() {
        let content = "Command exited with non-zero status 2\n0.02;0.01;0.00;1800\n";
        let timing = parse_timing_output(content, Path::new("x"), true).unwrap();
        assert_eq!(timing.resident_set_memory_kb, 1800);
    }

    #[test]
    fn test_parse_output_status_notice_fails_by_default() {
        let content = "Command exited with non-zero status 2\n0.02;0.01;0.00;1800\n";
        let err = parse_timing_output(content, Path::new("x"), false).unwrap_err();
        assert_eq!(
            err,
            ParseFailure::CommandFailed {
                notice: "Command exited with non-zero status 2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_output_only_notice_is_unexpected() {
        let content = "Command terminated by signal 9\n";
        let err = parse_timing_output(content, Path::new("x"), true).unwrap_err();
        assert!(matches!(err, ParseFailure::UnexpectedFormat { .. }));
    }

    #[test]
    fn test_parse_output_empty() {
        let err = parse_timing_output("\n  \n", Path::new("x"), false).unwrap_err();
        assert!(matches!(err, ParseFailure::EmptyArtifact { .. }));
    }

    #[test]
    fn test_reconcile_populates_store() {
        let (dir, mut store, task) = setup();
        write_artifact(dir.path(), &task, "0.5;0.4;0.1;3000\n");

        let reconciler = Reconciler::new(dir.path());
        let timing = reconciler.reconcile(&mut store, &task).unwrap();

        assert_eq!(store.get("t1").unwrap().timing_result, Some(timing));

        let reopened = ResultStore::open_in(dir.path(), false).unwrap();
        assert_eq!(reopened.get("t1").unwrap().timing_result, Some(timing));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (dir, mut store, task) = setup();
        write_artifact(dir.path(), &task, "0.5;0.4;0.1;3000\n");
        let reconciler = Reconciler::new(dir.path());

        let first = reconciler.reconcile(&mut store, &task).unwrap();
        let second = reconciler.reconcile(&mut store, &task).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get("t1").unwrap().timing_result, Some(second));
    }

    #[test]
    fn test_reconcile_missing_artifact_leaves_record() {
        let (dir, mut store, task) = setup();
        let reconciler = Reconciler::new(dir.path());

        let err = reconciler.reconcile(&mut store, &task).unwrap_err();

        assert!(matches!(err, ReconcileError::Parse(ParseFailure::MissingArtifact { .. })));
        assert!(store.get("t1").unwrap().timing_result.is_none());
    }

    #[test]
    fn test_reconcile_malformed_line_leaves_record() {
        let (dir, mut store, task) = setup();
        write_artifact(dir.path(), &task, "1.2;3.4\n");
        let reconciler = Reconciler::new(dir.path());

        let err = reconciler.reconcile(&mut store, &task).unwrap_err();

        assert!(matches!(err, ReconcileError::Parse(ParseFailure::UnexpectedFormat { .. })));
        assert!(store.get("t1").unwrap().timing_result.is_none());
    }

    #[test]
    fn test_reconcile_failed_command_leaves_record() {
        let (dir, mut store, task) = setup();
        write_artifact(
            dir.path(),
            &task,
            "Command exited with non-zero status 4\n0.01;0.00;0.00;1024\n",
        );

        let err = Reconciler::new(dir.path())
            .reconcile(&mut store, &task)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Parse(ParseFailure::CommandFailed { .. })));
        assert!(store.get("t1").unwrap().timing_result.is_none());

        let timing = Reconciler::new(dir.path())
            .with_allow_nonzero_exit(true)
            .reconcile(&mut store, &task)
            .unwrap();
        assert_eq!(store.get("t1").unwrap().timing_result, Some(timing));
    }

    #[test]
    fn test_reconcile_unknown_task_is_store_error() {
        let (dir, mut store, _) = setup();
        let stranger = TaskRecord::new("nope", "g", "ls", None, "ls", 0);
        write_artifact(dir.path(), &stranger, "0.1;0.1;0.1;10\n");

        let err = Reconciler::new(dir.path())
            .reconcile(&mut store, &stranger)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Store(StoreError::NotFound(_))));
    }
}
