//! The scheduler's view of a job.

use crate::id::JobId;
use crate::params::ParameterSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A job: identity, immutable state point, mutable document, and workspace
///
/// The store owns jobs; the scheduler works on a snapshot and writes the
/// document back through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    statepoint: ParameterSet,
    document: ParameterSet,
    workspace: PathBuf,
}

impl Job {
    /// Create a job view, deriving the id from the state point
    #[must_use]
    pub fn new(statepoint: ParameterSet, document: ParameterSet, workspace: PathBuf) -> Self {
        Self {
            id: JobId::identify(&statepoint),
            statepoint,
            document,
            workspace,
        }
    }

    /// Job identifier
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Immutable parameter set the id was derived from
    #[must_use]
    pub fn statepoint(&self) -> &ParameterSet {
        &self.statepoint
    }

    /// Auxiliary record
    #[must_use]
    pub fn document(&self) -> &ParameterSet {
        &self.document
    }

    /// Mutable access to the document
    pub fn document_mut(&mut self) -> &mut ParameterSet {
        &mut self.document
    }

    /// Replace the document, returning the old one
    pub fn replace_document(&mut self, document: ParameterSet) -> ParameterSet {
        std::mem::replace(&mut self.document, document)
    }

    /// Workspace directory of this job
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Path of a file inside the job workspace
    #[must_use]
    pub fn fn_path(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }

    /// Check whether a file exists inside the job workspace
    #[must_use]
    pub fn is_file(&self, name: &str) -> bool {
        self.fn_path(name).is_file()
    }
}
