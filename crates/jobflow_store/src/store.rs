//! Store interface consumed by the scheduler.

use crate::filter::JobFilter;
use jobflow_core::{CoreError, Job, JobId, ParameterSet};
use thiserror::Error;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Job not found
    #[error("Job not found: {id}")]
    NotFound {
        /// Requested id or prefix
        id: String,
    },
    /// More than one job matches a prefix
    #[error("Ambiguous job id prefix {prefix:?} matches {count} jobs")]
    AmbiguousPrefix {
        /// Requested prefix
        prefix: String,
        /// Number of matches
        count: usize,
    },
    /// Stored data does not hash to its job id
    #[error("Corrupt job {id}: {reason}")]
    Corrupt {
        /// Job id
        id: String,
        /// What is wrong
        reason: String,
    },
    /// IO error
    #[error("IO error at {path}: {reason}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error
        reason: String,
    },
    /// Serialization error
    #[error("Serialization error: {reason}")]
    Serialization {
        /// Underlying error
        reason: String,
    },
    /// Internal lock poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Persistent storage of job parameter sets and documents
///
/// Document writes are last-write-wins. The store does not serialize
/// writers; the executor guarantees at most one writer per job.
pub trait JobStore: Send + Sync {
    /// Load a job snapshot
    ///
    /// # Errors
    ///
    /// Returns error if the job does not exist or cannot be read
    fn get(&self, id: &JobId) -> StoreResult<Job>;

    /// Apply an update to a job's document and persist it
    ///
    /// # Errors
    ///
    /// Returns error if the job does not exist or the write fails
    fn mutate_document(
        &self,
        id: &JobId,
        updater: &mut dyn FnMut(&mut ParameterSet),
    ) -> StoreResult<()>;

    /// List job ids matching a filter, in ascending id order
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be enumerated
    fn iterate_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<JobId>>;

    /// Create the job for a parameter set, or return the existing one
    ///
    /// # Errors
    ///
    /// Returns error if the job cannot be created
    fn open_job(&self, statepoint: ParameterSet) -> StoreResult<JobId>;

    /// Resolve a full id or unique hex prefix to a job id
    ///
    /// # Errors
    ///
    /// Returns error if nothing or more than one job matches
    fn resolve_prefix(&self, prefix: &str) -> StoreResult<JobId> {
        let matches: Vec<JobId> = self
            .iterate_jobs(&JobFilter::all())?
            .into_iter()
            .filter(|id| id.matches_prefix(prefix))
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(StoreError::NotFound {
                id: prefix.to_string(),
            }),
            many => Err(StoreError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                count: many.len(),
            }),
        }
    }
}
