//! Auto-detection of a GNU `time` binary.
//!
//! When the configured `time_binary` does not answer, this module checks the
//! usual install locations in order.

use std::process::Command;
use std::sync::OnceLock;
use tracing::debug;

/// Default priority order for instrument detection.
pub const DEFAULT_CANDIDATES: &[&str] = &["/usr/bin/time", "gtime"];

/// Cached result of default detection for the process lifetime.
static DETECTED_INSTRUMENT: OnceLock<Option<String>> = OnceLock::new();

/// Error returned when no candidate is a usable GNU `time`.
#[derive(Debug, Clone)]
pub struct NoInstrumentError {
    /// Candidates that were checked.
    pub checked: Vec<String>,
}

impl std::fmt::Display for NoInstrumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "No GNU time binary found.")?;
        writeln!(f)?;
        writeln!(f, "Checked: {}", self.checked.join(", "))?;
        writeln!(f)?;
        writeln!(f, "Install one of the following:")?;
        writeln!(f, "  • Debian/Ubuntu: apt install time")?;
        writeln!(f, "  • Fedora:        dnf install time")?;
        writeln!(f, "  • macOS:         brew install gnu-time (provides gtime)")?;
        Ok(())
    }
}

impl std::error::Error for NoInstrumentError {}

/// Checks if `binary` is a GNU `time` by running `<binary> --version`.
pub fn is_instrument_available(binary: &str) -> bool {
    match Command::new(binary).arg("--version").output() {
        Ok(output) => {
            let available = output.status.success();
            debug!(binary = binary, available = available, "Instrument availability check");
            available
        }
        Err(_) => {
            debug!(binary = binary, available = false, "Instrument not found");
            false
        }
    }
}

/// Returns the first available candidate.
///
/// # Returns
/// * `Ok(binary)` - First candidate answering `--version`
/// * `Err(NoInstrumentError)` - None did
pub fn detect_instrument(candidates: &[&str]) -> Result<String, NoInstrumentError> {
    debug!(candidates = ?candidates, "Starting instrument auto-detection");

    let mut checked = Vec::new();
    for &candidate in candidates {
        checked.push(candidate.to_string());
        if is_instrument_available(candidate) {
            debug!(binary = candidate, "Instrument detected and selected");
            return Ok(candidate.to_string());
        }
    }

    debug!(checked = ?checked, "No instrument available");
    Err(NoInstrumentError { checked })
}

/// Detects an instrument from `DEFAULT_CANDIDATES`, once per process.
pub fn detect_instrument_default() -> Result<String, NoInstrumentError> {
    let detected = DETECTED_INSTRUMENT.get_or_init(|| detect_instrument(DEFAULT_CANDIDATES).ok());
    match detected {
        Some(binary) => {
            debug!(binary = %binary, "Using cached instrument detection result");
            Ok(binary.clone())
        }
        None => Err(NoInstrumentError {
            checked: DEFAULT_CANDIDATES.iter().map(|c| (*c).to_string()).collect(),
        }),
    }
}
