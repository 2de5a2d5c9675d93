//! In-memory job store.

use crate::filter::JobFilter;
use crate::store::{JobStore, StoreError, StoreResult};
use jobflow_core::{Job, JobId, ParameterSet};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// In-memory job store
///
/// Workspaces are virtual paths under `root`; nothing touches the disk.
pub struct MemoryStore {
    /// Root used to derive workspace paths
    root: PathBuf,
    /// Jobs indexed by id
    jobs: RwLock<BTreeMap<JobId, Job>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            jobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for MemoryStore {
    fn get(&self, id: &JobId) -> StoreResult<Job> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        jobs.get(id).cloned().ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })
    }

    fn mutate_document(
        &self,
        id: &JobId,
        updater: &mut dyn FnMut(&mut ParameterSet),
    ) -> StoreResult<()> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        let job = jobs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        updater(job.document_mut());
        Ok(())
    }

    fn iterate_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<JobId>> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs
            .values()
            .filter(|job| filter.matches(job))
            .map(Job::id)
            .collect())
    }

    fn open_job(&self, statepoint: ParameterSet) -> StoreResult<JobId> {
        let id = JobId::identify(&statepoint);
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        jobs.entry(id).or_insert_with(|| {
            Job::new(statepoint, ParameterSet::new(), self.root.join(id.to_hex()))
        });
        Ok(id)
    }
}
