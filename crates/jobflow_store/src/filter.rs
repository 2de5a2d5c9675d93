//! Job filters for `iterate_jobs`.

use jobflow_core::Job;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Equality filter over dotted paths in the state point and document
///
/// An empty filter matches every job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    /// Required state point values
    pub statepoint: Vec<(String, Value)>,
    /// Required document values
    pub document: Vec<(String, Value)>,
}

impl JobFilter {
    /// Filter matching every job
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Require a state point value
    #[must_use]
    pub fn with_statepoint(mut self, path: impl Into<String>, value: Value) -> Self {
        self.statepoint.push((path.into(), value));
        self
    }

    /// Require a document value
    #[must_use]
    pub fn with_document(mut self, path: impl Into<String>, value: Value) -> Self {
        self.document.push((path.into(), value));
        self
    }

    /// Check if the filter has no clauses
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statepoint.is_empty() && self.document.is_empty()
    }

    /// Whether the filter needs the job document
    #[must_use]
    pub fn needs_document(&self) -> bool {
        !self.document.is_empty()
    }

    /// Check a job against the filter
    #[must_use]
    pub fn matches(&self, job: &Job) -> bool {
        self.statepoint
            .iter()
            .all(|(path, value)| job.statepoint().get_path(path) == Some(value))
            && self
                .document
                .iter()
                .all(|(path, value)| job.document().get_path(path) == Some(value))
    }
}
