//! Testing utilities for deterministic runs without a real timing tool.

pub mod fake_instrument;

pub use fake_instrument::{FakeInstrument, FakeMetrics, MissingInstrument};
