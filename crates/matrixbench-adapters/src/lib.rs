//! # matrixbench-adapters
//!
//! Timing instrument implementations for matrixbench.
//!
//! The execution engine only knows the `TimingInstrument` trait. This crate
//! provides the production instrument, GNU `time`, which reports wall time,
//! user and kernel CPU time and peak resident set size through its `-f`
//! format string.
//!
//! ## Auto-Detection
//!
//! GNU `time` lives at `/usr/bin/time` on most Linux systems and is usually
//! installed as `gtime` elsewhere. The `auto_detect` module finds the first
//! candidate that answers `--version`.

mod auto_detect;
mod gnu_time;

pub use auto_detect::{
    DEFAULT_CANDIDATES, NoInstrumentError, detect_instrument, detect_instrument_default,
    is_instrument_available,
};
pub use gnu_time::{GNU_TIME_FORMAT, GnuTimeInstrument};
