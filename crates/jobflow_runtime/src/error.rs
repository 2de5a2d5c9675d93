//! Runtime errors.
//!
//! [`UnitError`] is scoped to a single (job, operation) pair and never stops
//! other pairs. [`RuntimeError`] aborts the whole batch.

use jobflow_core::JobId;
use jobflow_plan::{DirectiveError, MaterializeError, PlanError};
use jobflow_store::StoreError;
use std::fmt;
use thiserror::Error;

/// Runtime result type
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Which condition list a failing condition belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionPhase {
    /// Pre-condition
    Pre,
    /// Post-condition
    Post,
}

impl fmt::Display for ConditionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Failure of one (job, operation) pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// A condition raised while being evaluated
    #[error(
        "{phase}-condition #{index} of operation {operation:?} raised for job {job}: {reason}"
    )]
    ConditionEvaluation {
        /// Job id
        job: JobId,
        /// Operation name
        operation: String,
        /// Condition list
        phase: ConditionPhase,
        /// Index within the list, in registration order
        index: usize,
        /// Error raised by the condition
        reason: String,
    },
    /// Command template referenced an absent key
    #[error(transparent)]
    MissingPlaceholder(#[from] MaterializeError),
    /// A job-dependent directive raised
    #[error(transparent)]
    DirectiveResolution(#[from] DirectiveError),
    /// The body or process reported failure, was killed, or timed out
    #[error("Operation {operation:?} failed for job {job}: {reason}")]
    InvocationFailure {
        /// Job id
        job: JobId,
        /// Operation name
        operation: String,
        /// Failure description
        reason: String,
    },
}

impl UnitError {
    /// Job the failure belongs to
    #[must_use]
    pub fn job(&self) -> JobId {
        match self {
            Self::ConditionEvaluation { job, .. } | Self::InvocationFailure { job, .. } => *job,
            Self::MissingPlaceholder(
                MaterializeError::MissingPlaceholder { job, .. }
                | MaterializeError::InvalidPlaceholder { job, .. },
            ) => *job,
            Self::DirectiveResolution(err) => err.job,
        }
    }

    /// Operation the failure belongs to
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::ConditionEvaluation { operation, .. }
            | Self::InvocationFailure { operation, .. } => operation,
            Self::MissingPlaceholder(
                MaterializeError::MissingPlaceholder { operation, .. }
                | MaterializeError::InvalidPlaceholder { operation, .. },
            ) => operation,
            Self::DirectiveResolution(err) => &err.operation,
        }
    }

    /// Short kind name for reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConditionEvaluation { .. } => "condition",
            Self::MissingPlaceholder(_) => "placeholder",
            Self::DirectiveResolution(_) => "directive",
            Self::InvocationFailure { .. } => "invocation",
        }
    }
}

/// Batch-fatal errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Job state could not be read or written
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// The request names unknown operations or groups
    #[error("Invalid request: {0}")]
    Plan(#[from] PlanError),
}
