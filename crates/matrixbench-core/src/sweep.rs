//! Sweep expansion.
//!
//! Turns a command, a repetition count and a parameter sweep into the flat,
//! ordered list of task records a run will execute. Generation has no side
//! effects; persisting the tasks is the result store's job.

use crate::identity::{IdScheme, IdentityHasher};
use matrixbench_proto::TaskRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Upper bound on the number of tasks one sweep may generate.
pub const MAX_TASKS: usize = 1_000_000;

/// A numeric sweep over the half-open range `min..max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSweep {
    /// First value (inclusive).
    pub min: i64,

    /// Bound (exclusive).
    pub max: i64,

    /// Increment between values. Negative steps count down from `min`.
    #[serde(default = "default_step")]
    pub step: i64,

    /// Flag or token placed between the command and each value.
    #[serde(default)]
    pub prefix: String,
}

fn default_step() -> i64 {
    1
}

impl RangeSweep {
    /// Creates a range sweep.
    pub fn new(min: i64, max: i64, step: i64, prefix: impl Into<String>) -> Self {
        Self {
            min,
            max,
            step,
            prefix: prefix.into(),
        }
    }

    /// Number of values in the range, computed without expanding it.
    pub fn point_count(&self) -> Result<u64, SweepError> {
        if self.step == 0 {
            return Err(SweepError::ZeroStep);
        }
        let span = i128::from(self.max) - i128::from(self.min);
        let step = i128::from(self.step);
        if span == 0 || (span > 0) != (step > 0) {
            return Ok(0);
        }
        // Ceiling division of two same-signed values.
        let count = (span.abs() + step.abs() - 1) / step.abs();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    /// Returns the swept values in order.
    ///
    /// Fails with `SweepError::TooManyTasks` rather than allocating a range
    /// larger than `MAX_TASKS`.
    pub fn values(&self) -> Result<Vec<i64>, SweepError> {
        let count = self.point_count()?;
        if count > MAX_TASKS as u64 {
            return Err(SweepError::TooManyTasks {
                requested: u128::from(count),
                limit: MAX_TASKS,
            });
        }

        let mut values = Vec::with_capacity(count as usize);
        let mut current = self.min;
        while (self.step > 0 && current < self.max) || (self.step < 0 && current > self.max) {
            values.push(current);
            match current.checked_add(self.step) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(values)
    }

    /// Renders the parameter string for one value.
    fn param_for(&self, value: i64) -> String {
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            value.to_string()
        } else {
            format!("{prefix} {value}")
        }
    }
}

/// The parameter-generation mode of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Sweep {
    /// The command runs as-is.
    #[default]
    None,
    /// Each literal parameter is appended to the command, in caller order.
    Literal(Vec<String>),
    /// `prefix value` is appended for every value of the range.
    Range(RangeSweep),
}

impl Sweep {
    /// Parameter strings in generation order; `None` yields a single `None`.
    fn params(&self) -> Result<Vec<Option<String>>, SweepError> {
        match self {
            Sweep::None => Ok(vec![None]),
            Sweep::Literal(params) => Ok(params.iter().cloned().map(Some).collect()),
            Sweep::Range(range) => Ok(range
                .values()?
                .into_iter()
                .map(|value| Some(range.param_for(value)))
                .collect()),
        }
    }
}

/// Expands sweeps into task records.
#[derive(Debug, Clone)]
pub struct SweepGenerator {
    hasher: IdentityHasher,
}

impl SweepGenerator {
    /// Creates a generator using the given id scheme.
    pub fn new(scheme: IdScheme) -> Self {
        Self {
            hasher: IdentityHasher::new(scheme),
        }
    }

    /// Generates `repetitions` task records per sweep point.
    ///
    /// Every repetition of one sweep point shares a freshly generated
    /// `group_id`; distinct points never share one.
    pub fn generate(
        &mut self,
        command: &str,
        repetitions: u32,
        sweep: &Sweep,
    ) -> Result<Vec<TaskRecord>, SweepError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(SweepError::MissingCommand);
        }
        if repetitions == 0 {
            return Err(SweepError::ZeroRepetitions);
        }

        let params = sweep.params()?;
        let requested = params.len() as u128 * u128::from(repetitions);
        if requested > MAX_TASKS as u128 {
            return Err(SweepError::TooManyTasks {
                requested,
                limit: MAX_TASKS,
            });
        }
        let mut tasks = Vec::with_capacity(params.len() * repetitions as usize);

        for param in params {
            let group_id = Uuid::new_v4().to_string();
            let command_with_param = match &param {
                Some(p) => format!("{command} {p}"),
                None => command.to_string(),
            };

            for repetition_id in 0..repetitions {
                let id = self
                    .hasher
                    .next_id(&command_with_param, &group_id, repetition_id);
                tasks.push(TaskRecord::new(
                    id,
                    group_id.clone(),
                    command,
                    param.clone(),
                    command_with_param.clone(),
                    repetition_id,
                ));
            }
        }

        debug!(
            command = %command,
            repetitions,
            tasks = tasks.len(),
            scheme = ?self.hasher.scheme(),
            "Generated sweep tasks"
        );

        Ok(tasks)
    }
}

/// Errors raised while expanding a sweep.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SweepError {
    #[error("A command is required to generate benchmark tasks")]
    MissingCommand,

    #[error("Repetitions must be at least 1")]
    ZeroRepetitions,

    #[error("Range step must not be zero")]
    ZeroStep,

    #[error("Sweep would generate {requested} tasks, more than the limit of {limit}")]
    TooManyTasks { requested: u128, limit: usize },
}
