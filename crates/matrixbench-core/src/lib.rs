//! # matrixbench-core
//!
//! Core functionality for running benchmark matrices.
//!
//! This crate provides:
//! - Sweep generation of one task per (parameter, repetition) point
//! - Deterministic task identities
//! - The persistent result store
//! - Task execution under a timing instrument, with optional timeouts
//! - Reconciliation of timing artifacts into stored results
//! - The run orchestrator and its summaries

mod config;
mod executor;
mod identity;
mod orchestrator;
mod reconciler;
mod store;
mod summary;
mod sweep;
pub mod testing;

pub use config::{ConfigError, ConfigWarning, RunConfig};
pub use executor::{
    ArtifactPaths, COMMAND_OUTPUT_DIR, ExecutionEngine, ExecutionError, ExecutionOutcome,
    TIMING_OUTPUT_DIR, ensure_artifact_dirs,
};
pub use identity::{IdScheme, IdentityHasher, stable_id};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use reconciler::{
    ParseFailure, ReconcileError, Reconciler, parse_timing_line, parse_timing_output,
};
pub use store::{ResultStore, STORE_FILE_NAME, StoreError};
pub use summary::{FailedTask, FailureReason, MAX_CAPTURED_OUTPUT_BYTES, Summary, SummaryBuilder};
pub use sweep::{MAX_TASKS, RangeSweep, Sweep, SweepError, SweepGenerator};
