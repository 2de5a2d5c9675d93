//! Directory-backed job store.
//!
//! Layout: `<root>/<job-id>/statepoint.json` and
//! `<root>/<job-id>/document.json`. The job directory doubles as the job
//! workspace handed to operations.

use crate::filter::JobFilter;
use crate::store::{JobStore, StoreError, StoreResult};
use jobflow_core::{Job, JobId, ParameterSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File holding a job's state point
pub const STATEPOINT_FILE: &str = "statepoint.json";

/// File holding a job's document
pub const DOCUMENT_FILE: &str = "document.json";

/// Directory-backed job store
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (and create if needed) a workspace root
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be created
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, &e))?;
        Ok(Self { root })
    }

    /// Workspace root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    fn read_params(path: &Path) -> StoreResult<ParameterSet> {
        let text = fs::read_to_string(path).map_err(|e| io_error(path, &e))?;
        Ok(ParameterSet::from_json(&text)?)
    }

    fn read_document(dir: &Path) -> StoreResult<ParameterSet> {
        let path = dir.join(DOCUMENT_FILE);
        if path.is_file() {
            Self::read_params(&path)
        } else {
            Ok(ParameterSet::new())
        }
    }

    /// Write via temp file + rename
    fn write_atomic(path: &Path, params: &ParameterSet) -> StoreResult<()> {
        let text = serde_json::to_string_pretty(params)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| io_error(&tmp, &e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, &e))
    }
}

impl JobStore for DirectoryStore {
    fn get(&self, id: &JobId) -> StoreResult<Job> {
        let dir = self.job_dir(id);
        if !dir.is_dir() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        let statepoint = Self::read_params(&dir.join(STATEPOINT_FILE))?;
        let document = Self::read_document(&dir)?;
        let job = Job::new(statepoint, document, dir);
        if job.id() != *id {
            return Err(StoreError::Corrupt {
                id: id.to_string(),
                reason: format!("state point hashes to {}", job.id()),
            });
        }
        Ok(job)
    }

    fn mutate_document(
        &self,
        id: &JobId,
        updater: &mut dyn FnMut(&mut ParameterSet),
    ) -> StoreResult<()> {
        let dir = self.job_dir(id);
        if !dir.is_dir() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        let mut document = Self::read_document(&dir)?;
        updater(&mut document);
        Self::write_atomic(&dir.join(DOCUMENT_FILE), &document)?;
        debug!(job = %id, keys = document.len(), "Document written");
        Ok(())
    }

    fn iterate_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<JobId>> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(&self.root, &e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.root, &e))?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|s| s.parse::<JobId>().ok()) else {
                continue;
            };
            if !entry.path().join(STATEPOINT_FILE).is_file() {
                warn!(path = %entry.path().display(), "Skipping job directory without state point");
                continue;
            }
            if filter.is_empty() || filter.matches(&self.get(&id)?) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn open_job(&self, statepoint: ParameterSet) -> StoreResult<JobId> {
        let id = JobId::identify(&statepoint);
        let dir = self.job_dir(&id);
        let path = dir.join(STATEPOINT_FILE);
        if path.is_file() {
            return Ok(id);
        }
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
        Self::write_atomic(&path, &statepoint)?;
        debug!(job = %id, "Job initialized");
        Ok(id)
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sp(value: serde_json::Value) -> ParameterSet {
        ParameterSet::from_value(value).unwrap()
    }

    #[test]
    fn test_open_and_get() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path().join("workspace")).unwrap();
        let id = store.open_job(sp(json!({"T": 1.5, "n": 4}))).unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.id(), id);
        assert_eq!(job.statepoint().get("n"), Some(&json!(4)));
        assert!(job.document().is_empty());
        assert!(job.workspace().join(STATEPOINT_FILE).is_file());
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let a = store.open_job(sp(json!({"a": 1}))).unwrap();
        store.mutate_document(&a, &mut |d| {
            d.insert("k", json!("v"));
        })
        .unwrap();
        let b = store.open_job(sp(json!({"a": 1}))).unwrap();
        assert_eq!(a, b);
        // Reopening keeps the document
        assert_eq!(store.get(&a).unwrap().document().get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_mutate_document_persists() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let id = store.open_job(sp(json!({"a": 1}))).unwrap();

        store
            .mutate_document(&id, &mut |d| {
                d.insert("count", json!(1));
            })
            .unwrap();
        store
            .mutate_document(&id, &mut |d| {
                d.insert("count", json!(2));
            })
            .unwrap();

        let reopened = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get(&id).unwrap().document().get("count"),
            Some(&json!(2))
        );
    }

    #[test]
    fn test_iterate_skips_foreign_entries() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.open_job(sp(json!({"a": 1}))).unwrap();
        store.open_job(sp(json!({"a": 2}))).unwrap();
        fs::create_dir(dir.path().join("not-a-job")).unwrap();
        fs::write(dir.path().join("README"), "x").unwrap();

        let ids = store.iterate_jobs(&JobFilter::all()).unwrap();
        assert_eq!(ids.len(), 2);

        let filtered = store
            .iterate_jobs(&JobFilter::all().with_statepoint("a", json!(2)))
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_corrupt_statepoint_detected() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let id = store.open_job(sp(json!({"a": 1}))).unwrap();
        fs::write(
            dir.path().join(id.to_hex()).join(STATEPOINT_FILE),
            r#"{"a": 2}"#,
        )
        .unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_missing_job() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let id = JobId::identify(&sp(json!({"missing": true})));
        assert!(matches!(store.get(&id), Err(StoreError::NotFound { .. })));
        assert!(matches!(
            store.mutate_document(&id, &mut |_| {}),
            Err(StoreError::NotFound { .. })
        ));
    }
}
