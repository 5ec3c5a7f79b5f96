//! Content-derived task identifiers.
//!
//! Ids are SHA-256 hex digests. The default `Stable` scheme hashes each task
//! independently, so an id depends only on what the task runs and which group
//! and repetition it belongs to. The `Cumulative` scheme keeps one hasher for
//! a whole generation pass and reports its running digest after every command,
//! which reproduces how older result directories were keyed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How task ids are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// `sha256(command_with_param, group_id, repetition_id)` per task.
    #[default]
    Stable,
    /// Running digest over every `command_with_param` seen so far.
    Cumulative,
}

/// Derives task ids for one generation pass.
#[derive(Debug, Clone)]
pub struct IdentityHasher {
    scheme: IdScheme,
    accumulator: Sha256,
}

impl IdentityHasher {
    /// Creates a hasher with a fresh accumulator.
    pub fn new(scheme: IdScheme) -> Self {
        Self {
            scheme,
            accumulator: Sha256::new(),
        }
    }

    /// Returns the scheme in use.
    pub fn scheme(&self) -> IdScheme {
        self.scheme
    }

    /// Returns the id for the next generated task.
    pub fn next_id(
        &mut self,
        command_with_param: &str,
        group_id: &str,
        repetition_id: u32,
    ) -> String {
        match self.scheme {
            IdScheme::Stable => stable_id(command_with_param, group_id, repetition_id),
            IdScheme::Cumulative => {
                self.accumulator.update(command_with_param.as_bytes());
                hex::encode(self.accumulator.clone().finalize())
            }
        }
    }
}

/// Order-independent id for a single task.
pub fn stable_id(command_with_param: &str, group_id: &str, repetition_id: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command_with_param.as_bytes());
    hasher.update([0u8]);
    hasher.update(group_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(repetition_id.to_le_bytes());
    hex::encode(hasher.finalize())
}
