//! Condition evaluation for (job, operation) pairs.

use crate::error::{ConditionPhase, UnitError};
use jobflow_core::Job;
use jobflow_plan::{Condition, Operation, Registry};
use std::fmt;
use tracing::debug;

/// Outcome of evaluating an operation against a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eligibility {
    /// All pre-conditions hold and no post-condition holds
    Eligible,
    /// Pre-condition at `index` does not hold
    Blocked {
        /// First failing pre-condition
        index: usize,
    },
    /// Post-condition at `index` holds; the operation is already done
    Ineligible {
        /// First satisfied post-condition
        index: usize,
    },
    /// Evaluation bypassed by an explicit override
    Forced,
}

impl Eligibility {
    /// Whether the pair should be executed
    #[must_use]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, Self::Eligible | Self::Forced)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eligible => write!(f, "eligible"),
            Self::Blocked { index } => write!(f, "blocked (pre #{index})"),
            Self::Ineligible { index } => write!(f, "complete (post #{index})"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Evaluates pre- and post-conditions
///
/// Pre-conditions are checked first, in registration order, so an operation
/// whose pre-condition fails is `Blocked` even if it also looks complete.
/// `after` conditions are answered by evaluating the target operation's
/// post-conditions on the same job.
pub struct ConditionEngine<'r> {
    registry: &'r Registry,
}

impl<'r> ConditionEngine<'r> {
    /// Create an engine over a registry
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Evaluate one operation for one job
    ///
    /// # Errors
    ///
    /// Returns error naming the job, operation, and condition index if a
    /// condition raises
    pub fn eligible(&self, job: &Job, operation: &Operation) -> Result<Eligibility, UnitError> {
        let mut stack = Vec::new();

        for (index, condition) in operation.pre_conditions().iter().enumerate() {
            let holds = self
                .holds(job, condition, &mut stack)
                .map_err(|e| condition_error(job, operation, ConditionPhase::Pre, index, &e))?;
            if !holds {
                debug!(job = %job.id(), operation = operation.name(), index, "Blocked");
                return Ok(Eligibility::Blocked { index });
            }
        }

        for (index, condition) in operation.post_conditions().iter().enumerate() {
            let holds = self
                .holds(job, condition, &mut stack)
                .map_err(|e| condition_error(job, operation, ConditionPhase::Post, index, &e))?;
            if holds {
                debug!(job = %job.id(), operation = operation.name(), index, "Already complete");
                return Ok(Eligibility::Ineligible { index });
            }
        }

        Ok(Eligibility::Eligible)
    }

    /// Whether an operation is complete for a job: one of its
    /// post-conditions holds
    ///
    /// # Errors
    ///
    /// Returns error if the operation is unknown or a condition raises
    pub fn is_complete(&self, job: &Job, operation: &str) -> anyhow::Result<bool> {
        self.complete(job, operation, &mut Vec::new())
    }

    fn holds(&self, job: &Job, condition: &Condition, stack: &mut Vec<String>) -> anyhow::Result<bool> {
        condition.evaluate(job, &mut |target| self.complete(job, target, stack))
    }

    fn complete(&self, job: &Job, operation: &str, stack: &mut Vec<String>) -> anyhow::Result<bool> {
        if stack.iter().any(|name| name == operation) {
            anyhow::bail!(
                "cyclic `after` dependency: {} -> {operation}",
                stack.join(" -> ")
            );
        }
        let Some(target) = self.registry.operation(operation) else {
            anyhow::bail!("unknown operation {operation:?}");
        };

        stack.push(operation.to_string());
        let mut result = Ok(false);
        for condition in target.post_conditions() {
            match self.holds(job, condition, stack) {
                Ok(false) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }
        stack.pop();
        result
    }
}

fn condition_error(
    job: &Job,
    operation: &Operation,
    phase: ConditionPhase,
    index: usize,
    err: &anyhow::Error,
) -> UnitError {
    UnitError::ConditionEvaluation {
        job: job.id(),
        operation: operation.name().to_string(),
        phase,
        index,
        reason: format!("{err:#}"),
    }
}
