//! # matrixbench-proto
//!
//! Shared types and traits for the matrixbench workspace.
//!
//! This crate provides the foundational abstractions used across all
//! matrixbench crates, including:
//! - The persisted task record and its timing metrics
//! - The derived task state used by the run orchestrator
//! - The timing instrument capability the execution engine depends on

mod instrument;
mod task;

pub use instrument::{InstrumentError, TimingInstrument};
pub use task::{TaskRecord, TaskState, TimingResult};
