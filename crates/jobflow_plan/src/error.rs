//! Planner errors.

use jobflow_core::JobId;
use thiserror::Error;

/// Planner result type
pub type PlanResult<T> = Result<T, PlanError>;

/// Registration and composition errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Operation registered twice
    #[error("Operation already registered: {name}")]
    DuplicateOperation {
        /// Operation name
        name: String,
    },
    /// Group registered twice
    #[error("Group already registered: {name}")]
    DuplicateGroup {
        /// Group name
        name: String,
    },
    /// An operation and a group share a name
    #[error("Name {name:?} is used by both an operation and a group")]
    NameClash {
        /// Clashing name
        name: String,
    },
    /// Requested operation does not exist
    #[error("Unknown operation: {name}")]
    UnknownOperation {
        /// Operation name
        name: String,
    },
    /// Requested group does not exist
    #[error("Unknown group: {name}")]
    UnknownGroup {
        /// Group name
        name: String,
    },
    /// A group lists an operation that is not registered
    #[error("Group {group:?} references unknown operation {operation:?}")]
    UnknownMember {
        /// Group name
        group: String,
        /// Missing operation
        operation: String,
    },
    /// An `after` condition names an operation that is not registered
    #[error("Operation {operation:?} waits on unknown operation {target:?}")]
    UnknownDependency {
        /// Operation carrying the condition
        operation: String,
        /// Missing target
        target: String,
    },
}

/// A job-dependent directive failed to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Directive {directive:?} of operation {operation:?} failed for job {job}: {reason}")]
pub struct DirectiveError {
    /// Job the directive was evaluated against
    pub job: JobId,
    /// Operation owning the directive
    pub operation: String,
    /// Directive name
    pub directive: String,
    /// Error raised by the directive function
    pub reason: String,
}

/// Command materialization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    /// Placeholder references a key the job does not have
    #[error("Operation {operation:?}: job {job} has no value for placeholder key {key:?}")]
    MissingPlaceholder {
        /// Job id
        job: JobId,
        /// Operation name
        operation: String,
        /// Missing key (dotted path)
        key: String,
    },
    /// Placeholder uses an unknown namespace
    #[error("Operation {operation:?}: invalid placeholder {{{placeholder}}} for job {job}")]
    InvalidPlaceholder {
        /// Job id
        job: JobId,
        /// Operation name
        operation: String,
        /// Placeholder text without braces
        placeholder: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::ParameterSet;

    #[test]
    fn test_plan_error_display() {
        let err = PlanError::UnknownMember {
            group: "gpu".to_string(),
            operation: "train".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Group \"gpu\" references unknown operation \"train\""
        );
    }

    #[test]
    fn test_materialize_error_names_job_and_key() {
        let job = JobId::identify(&ParameterSet::new());
        let err = MaterializeError::MissingPlaceholder {
            job,
            operation: "simulate".to_string(),
            key: "T".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains(&job.to_hex()));
        assert!(s.contains("\"T\""));
    }

    #[test]
    fn test_invalid_placeholder_display() {
        let job = JobId::identify(&ParameterSet::new());
        let err = MaterializeError::InvalidPlaceholder {
            job,
            operation: "op".to_string(),
            placeholder: "foo".to_string(),
        };
        assert!(err.to_string().contains("{foo}"));
    }
}
