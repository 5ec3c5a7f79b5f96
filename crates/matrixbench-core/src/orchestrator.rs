//! Run orchestration.
//!
//! Composes the sweep generator, result store, execution engine and
//! reconciler. Tasks run strictly one after another; each goes
//! `Pending → Running → {Succeeded, Failed}` and the outcome is folded into a
//! `SummaryBuilder` passed through the loop by value.

use crate::config::{ConfigError, RunConfig};
use crate::executor::{ArtifactPaths, ExecutionEngine, ExecutionError, ensure_artifact_dirs};
use crate::reconciler::{ReconcileError, Reconciler};
use crate::store::{ResultStore, STORE_FILE_NAME, StoreError};
use crate::summary::{FailedTask, FailureReason, Summary, SummaryBuilder};
use crate::sweep::{SweepError, SweepGenerator};
use matrixbench_proto::{TaskRecord, TaskState, TimingInstrument};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    #[error("Output directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No result store found at {}", .0.display())]
    MissingStore(PathBuf),

    #[error(
        "Generated task id {id} is already stored; merging would overwrite it \
         (cumulative ids repeat across runs, use the stable id scheme to merge)"
    )]
    DuplicateTask { id: String },
}

/// Drives benchmark runs for one configuration.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: RunConfig,
    engine: ExecutionEngine,
}

impl Orchestrator {
    /// Creates an orchestrator that measures tasks with `instrument`.
    pub fn new(config: RunConfig, instrument: Arc<dyn TimingInstrument>) -> Self {
        let engine = ExecutionEngine::new(instrument).with_timeout(config.timeout());
        Self { config, engine }
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Generates the task matrix without persisting or running anything.
    pub fn plan(&self) -> Result<Vec<TaskRecord>, OrchestratorError> {
        self.config.validate()?;
        let sweep = self.config.sweep()?;
        let command = self.config.command().ok_or(ConfigError::MissingCommand)?;
        let tasks = SweepGenerator::new(self.config.id_scheme).generate(
            command,
            self.config.repetitions,
            &sweep,
        )?;
        Ok(tasks)
    }

    /// Generates (or, for retry-only-failed, selects) tasks, runs each one and
    /// reconciles its metrics.
    ///
    /// Without `merge` an existing store in the output directory is purged.
    /// With `merge` newly generated tasks are stored alongside earlier ones,
    /// and only the new tasks run. With `retry_failed` nothing is generated:
    /// exactly the stored tasks lacking a timing result run again.
    pub async fn generate_and_run(&self) -> Result<Summary, OrchestratorError> {
        let warnings = self.config.validate()?;
        for warning in &warnings {
            warn!("{warning}");
        }

        // Generate before touching the store so a bad sweep leaves it intact.
        let generated = if self.config.retry_failed {
            None
        } else {
            Some(self.plan()?)
        };

        let output_dir = self.output_dir();
        fs::create_dir_all(output_dir)?;
        ensure_artifact_dirs(output_dir)?;

        let purge = !self.config.merge && !self.config.retry_failed;
        if purge && output_dir.join(STORE_FILE_NAME).exists() {
            info!(output_dir = %output_dir.display(), "Merge disabled, purging existing results");
        }
        let mut store = ResultStore::open_in(output_dir, purge)?;

        let working = match generated {
            Some(tasks) => {
                // Merged tasks go alongside stored ones, never over them.
                if let Some(task) = tasks.iter().find(|t| store.get(&t.id).is_some()) {
                    return Err(OrchestratorError::DuplicateTask {
                        id: task.id.clone(),
                    });
                }
                store.insert_all(tasks.clone())?;
                tasks
            }
            None => {
                let failed = store.pending_or_failed();
                if store.is_empty() {
                    warn!(output_dir = %output_dir.display(), "No stored tasks to retry");
                }
                info!(selected = failed.len(), stored = store.len(), "Retrying tasks without timing results");
                failed
            }
        };

        if let Err(e) = self.engine.instrument().probe().await {
            warn!(error = %e, "Timing instrument probe failed, tasks are likely to fail");
        }

        info!(
            tasks = working.len(),
            instrument = self.engine.instrument().name(),
            output_dir = %output_dir.display(),
            "Starting benchmark run"
        );

        let reconciler =
            Reconciler::new(output_dir).with_allow_nonzero_exit(self.config.allow_nonzero_exit);
        let mut builder = SummaryBuilder::new();
        for task in &working {
            builder = self.run_task(&mut store, &reconciler, task, builder).await?;
        }

        let summary = builder.finish();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Benchmark run finished"
        );
        Ok(summary)
    }

    /// Re-reads the timing artifacts of every stored task without executing
    /// anything.
    pub async fn reconcile_existing(&self) -> Result<Summary, OrchestratorError> {
        let output_dir = self.output_dir();
        let store_path = output_dir.join(STORE_FILE_NAME);
        if !store_path.exists() {
            return Err(OrchestratorError::MissingStore(store_path));
        }

        let mut store = ResultStore::open(&store_path, false)?;
        let reconciler =
            Reconciler::new(output_dir).with_allow_nonzero_exit(self.config.allow_nonzero_exit);
        info!(tasks = store.len(), output_dir = %output_dir.display(), "Reconciling stored timing outputs");

        let mut builder = SummaryBuilder::new();
        for task in store.all_records() {
            builder = match reconciler.reconcile(&mut store, &task) {
                Ok(_) => builder.succeeded(),
                Err(ReconcileError::Parse(failure)) => builder.failed(self.failure(
                    &task,
                    FailureReason::Parse(failure),
                )),
                Err(ReconcileError::Store(e)) => return Err(e.into()),
            };
        }

        let summary = builder.finish();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Reconcile finished"
        );
        Ok(summary)
    }

    /// Runs and reconciles one task, folding its outcome into `builder`.
    async fn run_task(
        &self,
        store: &mut ResultStore,
        reconciler: &Reconciler,
        task: &TaskRecord,
        builder: SummaryBuilder,
    ) -> Result<SummaryBuilder, OrchestratorError> {
        // Entering Running: a previous result must not survive a failed attempt.
        let mut record = task.clone();
        record.timing_result = None;
        store.update(&record)?;
        log_transition(&record, TaskState::Running);

        let outcome = match self.engine.run(&record, self.output_dir()).await {
            Ok(outcome) => outcome,
            Err(ExecutionError::Io(e)) => return Err(e.into()),
            Err(e @ (ExecutionError::Instrument(_) | ExecutionError::Spawn { .. })) => {
                warn!(
                    task_id = %record.id,
                    repetition = record.repetition_id,
                    command = %record.command_with_param,
                    error = %e,
                    "Task could not be executed"
                );
                return Ok(self.record_failure(
                    builder,
                    &record,
                    FailureReason::InstrumentFailed(e.to_string()),
                ));
            }
        };

        if outcome.timed_out {
            return Ok(self.record_failure(builder, &record, FailureReason::TimedOut));
        }
        if !outcome.success && !self.config.allow_nonzero_exit {
            return Ok(self.record_failure(
                builder,
                &record,
                FailureReason::NonZeroExit(outcome.exit_code),
            ));
        }

        match reconciler.reconcile(store, &record) {
            Ok(_) => {
                debug!(
                    task_id = %record.id,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Task finished"
                );
                log_transition(&record, TaskState::Succeeded);
                Ok(builder.succeeded())
            }
            Err(ReconcileError::Parse(failure)) => {
                Ok(self.record_failure(builder, &record, FailureReason::Parse(failure)))
            }
            Err(ReconcileError::Store(e)) => Err(e.into()),
        }
    }

    fn record_failure(
        &self,
        builder: SummaryBuilder,
        task: &TaskRecord,
        reason: FailureReason,
    ) -> SummaryBuilder {
        debug!(task_id = %task.id, reason = %reason, "Task failed");
        log_transition(task, TaskState::Failed);
        builder.failed(self.failure(task, reason))
    }

    fn failure(&self, task: &TaskRecord, reason: FailureReason) -> FailedTask {
        let paths = ArtifactPaths::for_task(self.output_dir(), task);
        FailedTask::new(task, reason, &paths.command_output)
    }
}

fn log_transition(task: &TaskRecord, state: TaskState) {
    debug!(
        task_id = %task.id,
        repetition = task.repetition_id,
        state = %state,
        terminal = state.is_terminal(),
        "Task state change"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::RangeSweep;
    use crate::testing::{FakeInstrument, MissingInstrument};
    use tempfile::TempDir;

    fn config(dir: &TempDir, command: &str) -> RunConfig {
        RunConfig {
            output_dir: dir.path().join("out"),
            ..RunConfig::for_command(command)
        }
    }

    #[tokio::test]
    async fn test_plan_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, "sort");
        cfg.range = Some(RangeSweep::new(0, 10, 5, "-n"));
        cfg.repetitions = 2;

        let tasks = Orchestrator::new(cfg, Arc::new(FakeInstrument::new()))
            .plan()
            .unwrap();

        assert_eq!(tasks.len(), 4);
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_conflicting_sweep_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, "echo");
        cfg.params = vec!["a".to_string()];
        cfg.range = Some(RangeSweep::new(0, 2, 1, ""));
        let fake = FakeInstrument::new();

        let err = Orchestrator::new(cfg, Arc::new(fake.clone()))
            .generate_and_run()
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Config(ConfigError::ConflictingSweep)));
        assert!(fake.invocations().is_empty());
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_task() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, "echo broken; exit 4");

        let summary = Orchestrator::new(cfg, Arc::new(FakeInstrument::new()))
            .generate_and_run()
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.reason, FailureReason::NonZeroExit(Some(4)));
        assert!(failure.output.as_deref().unwrap().contains("broken"));

        let store = ResultStore::open_in(dir.path().join("out"), false).unwrap();
        assert!(store.get(&failure.id).unwrap().timing_result.is_none());
    }

    #[tokio::test]
    async fn test_allow_nonzero_exit_records_metrics() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, "exit 1");
        cfg.allow_nonzero_exit = true;

        let summary = Orchestrator::new(cfg, Arc::new(FakeInstrument::new()))
            .generate_and_run()
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_missing_instrument_fails_each_task() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, "true");
        cfg.repetitions = 3;

        let summary = Orchestrator::new(cfg, Arc::new(MissingInstrument::default()))
            .generate_and_run()
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 3);
        assert!(summary
            .failures
            .iter()
            .all(|f| matches!(f.reason, FailureReason::InstrumentFailed(_))));
    }

    #[tokio::test]
    async fn test_reconcile_existing_requires_store() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, "true");

        let err = Orchestrator::new(cfg, Arc::new(FakeInstrument::new()))
            .reconcile_existing()
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::MissingStore(_)));
    }

    #[tokio::test]
    async fn test_timeout_fails_task() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, "sleep 10");
        cfg.timeout_seconds = Some(1);

        let summary = Orchestrator::new(cfg, Arc::new(FakeInstrument::new()))
            .generate_and_run()
            .await
            .unwrap();

        assert_eq!(summary.failures[0].reason, FailureReason::TimedOut);
    }
}
