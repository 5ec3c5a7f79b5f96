//! The timing instrument capability.
//!
//! The execution engine never shells out to a timing tool directly. It asks a
//! `TimingInstrument` for a process that runs the benchmarked command and
//! writes one `wall;user;kernel;max_rss_kb` line to a given file, then wires
//! the child's stdout and stderr itself.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Errors raised by a timing instrument.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// The instrument is not installed or not usable on this host.
    #[error("Timing instrument '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    /// IO error while preparing the instrumented process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can measure wall time, CPU time and peak RSS of a child
/// process.
#[async_trait]
pub trait TimingInstrument: Send + Sync + std::fmt::Debug {
    /// Short human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Checks that the instrument can be invoked on this host.
    async fn probe(&self) -> Result<(), InstrumentError>;

    /// Builds the process that runs `shell_command` under the instrument.
    ///
    /// The returned command must write exactly one metrics line in the form
    /// `wall_time;user_time;kernel_time;max_rss_kb` to `timing_output` when
    /// the child exits. The caller owns stdio configuration.
    fn command(
        &self,
        shell_command: &str,
        timing_output: &Path,
    ) -> Result<Command, InstrumentError>;
}
