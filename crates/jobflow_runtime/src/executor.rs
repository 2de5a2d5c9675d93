//! Invocation executor.
//!
//! Units for different jobs run in parallel, up to `max_parallel` jobs at a
//! time. Units for the same job never overlap: each job has its own lock,
//! held for the full lifetime of an invocation, including a function body
//! that outlived its timeout.

use crate::error::{RuntimeResult, UnitError};
use crate::scheduler::{ScheduledUnit, UnitState};
use futures::future::join_all;
use indexmap::IndexMap;
use jobflow_core::{JobId, ParameterSet};
use jobflow_plan::{Invocation, OperationFn};
use jobflow_store::JobStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, Semaphore};
use tracing::{info, warn};

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of jobs executing at once
    pub max_parallel: usize,
    /// Per-invocation time limit
    pub timeout: Option<Duration>,
    /// Shell used for command operations
    pub shell: String,
    /// Working directory for command operations not run inside the job
    pub project_root: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            timeout: None,
            shell: "sh".to_string(),
            project_root: PathBuf::from("."),
        }
    }
}

impl ExecutorConfig {
    /// Set maximum parallel jobs (at least one)
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    /// Set per-invocation timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set shell program
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set project root
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }
}

/// Result of executing one unit
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    /// Job id
    pub job: JobId,
    /// Operation name
    pub operation: String,
    /// Group the operation ran under
    pub group: Option<String>,
    /// `Executed` or `Failed`
    pub state: UnitState,
    /// Failure, if any
    pub error: Option<UnitError>,
    /// Whether conditions were bypassed
    pub forced: bool,
    /// When the job lock was acquired
    pub started: Instant,
    /// When the invocation returned
    pub finished: Instant,
}

impl UnitOutcome {
    /// Wall-clock duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }

    /// Check if the unit succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == UnitState::Executed
    }
}

/// Runs scheduled units
pub struct Executor {
    config: ExecutorConfig,
    store: Arc<dyn JobStore>,
    locks: Mutex<HashMap<JobId, Arc<AsyncMutex<()>>>>,
}

impl Executor {
    /// Create an executor writing documents back to `store`
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, config: ExecutorConfig) -> Self {
        Self {
            config,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute units; outcomes are returned in input order
    ///
    /// # Errors
    ///
    /// Returns error if a job cannot be read from the store
    pub async fn execute(&self, units: Vec<ScheduledUnit>) -> RuntimeResult<Vec<UnitOutcome>> {
        self.execute_with(units, &|_| {}).await
    }

    /// Execute units, reporting each outcome as it completes
    ///
    /// # Errors
    ///
    /// Returns error if a job cannot be read from the store
    pub async fn execute_with(
        &self,
        units: Vec<ScheduledUnit>,
        on_outcome: &(dyn Fn(&UnitOutcome) + Sync),
    ) -> RuntimeResult<Vec<UnitOutcome>> {
        let mut lanes: IndexMap<JobId, Vec<(usize, ScheduledUnit)>> = IndexMap::new();
        for (index, unit) in units.into_iter().enumerate() {
            lanes.entry(unit.job).or_default().push((index, unit));
        }

        let semaphore = Semaphore::new(self.config.max_parallel.max(1));
        let lanes = lanes.into_values().map(|lane| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let mut done = Vec::with_capacity(lane.len());
                for (index, unit) in lane {
                    let outcome = self.execute_unit(unit).await?;
                    on_outcome(&outcome);
                    done.push((index, outcome));
                }
                RuntimeResult::Ok(done)
            }
        });

        let mut outcomes = Vec::new();
        for lane in join_all(lanes).await {
            outcomes.extend(lane?);
        }
        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Execute a single unit, waiting for any other unit on the same job
    ///
    /// # Errors
    ///
    /// Returns error if the job cannot be read from the store
    pub async fn execute_unit(&self, unit: ScheduledUnit) -> RuntimeResult<UnitOutcome> {
        let guard = self.job_lock(unit.job).lock_owned().await;
        let started = Instant::now();
        info!(
            job = %unit.job,
            operation = %unit.operation,
            group = unit.group.as_deref().unwrap_or("-"),
            forced = unit.forced,
            "Executing"
        );

        let result = match &unit.invocation {
            Invocation::Call { body, .. } => self.call(unit.job, body.clone(), guard).await?,
            Invocation::Shell {
                command,
                working_dir,
                ..
            } => {
                let result = self.shell(command, working_dir.as_deref()).await;
                drop(guard);
                result
            }
        };
        let finished = Instant::now();

        let error = result.err().map(|reason| UnitError::InvocationFailure {
            job: unit.job,
            operation: unit.operation.clone(),
            reason,
        });
        match &error {
            Some(err) => warn!(job = %unit.job, operation = %unit.operation, error = %err, "Failed"),
            None => info!(
                job = %unit.job,
                operation = %unit.operation,
                elapsed_ms = finished.duration_since(started).as_millis() as u64,
                "Executed"
            ),
        }

        Ok(UnitOutcome {
            job: unit.job,
            operation: unit.operation,
            group: unit.group,
            state: UnitState::Eligible.finish(error.is_none()),
            error,
            forced: unit.forced,
            started,
            finished,
        })
    }

    fn job_lock(&self, job: JobId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(job).or_default())
    }

    /// Run a function body on a blocking thread and persist the document on
    /// success
    async fn call(
        &self,
        id: JobId,
        body: OperationFn,
        guard: OwnedMutexGuard<()>,
    ) -> RuntimeResult<Result<(), String>> {
        let mut job = self.store.get(&id)?;
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let result = body(&mut job).map_err(|e| format!("{e:#}"));
            (job, result)
        });

        let joined = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => return Ok(Err(format!("timed out after {limit:?}"))),
            },
            None => task.await,
        };
        let (job, result) = match joined {
            Ok(pair) => pair,
            Err(e) => return Ok(Err(format!("operation panicked: {e}"))),
        };
        if let Err(reason) = result {
            return Ok(Err(reason));
        }

        let document = job.document();
        let persisted = self
            .store
            .mutate_document(&id, &mut |doc: &mut ParameterSet| *doc = document.clone());
        Ok(persisted.map_err(|e| format!("document not saved: {e}")))
    }

    async fn shell(&self, command: &str, working_dir: Option<&Path>) -> Result<(), String> {
        let dir = working_dir.unwrap_or(&self.config.project_root);
        let mut child = Command::new(&self.config.shell)
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {:?} in {}: {e}", self.config.shell, dir.display()))?;

        let status = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(format!("timed out after {limit:?}"));
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| format!("failed to wait for process: {e}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(match status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{EligibilityScheduler, ForceSet};
    use jobflow_plan::{Operation, Registry, Scope};
    use jobflow_store::{DirectoryStore, MemoryStore};
    use serde_json::json;

    fn open(store: &dyn JobStore, sps: &[serde_json::Value]) -> Vec<JobId> {
        sps.iter()
            .map(|sp| store.open_job(ParameterSet::from_value(sp.clone()).unwrap()).unwrap())
            .collect()
    }

    fn schedule(
        registry: Registry,
        store: Arc<dyn JobStore>,
        ids: &[JobId],
    ) -> Vec<ScheduledUnit> {
        EligibilityScheduler::new(Arc::new(registry), store)
            .schedule(ids, &Scope::All, &ForceSet::None)
            .unwrap()
            .units
    }

    #[tokio::test]
    async fn test_function_persists_document() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = open(store.as_ref(), &[json!({"n": 3})]);
        let registry = Registry::builder()
            .operation(Operation::function("square", |job| {
                let n = job.statepoint().get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                job.document_mut().insert("square", json!(n * n));
                Ok(())
            }))
            .unwrap()
            .build()
            .unwrap();

        let units = schedule(registry, Arc::clone(&store), &ids);
        let executor = Executor::new(Arc::clone(&store), ExecutorConfig::default());
        let outcomes = executor.execute(units).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].succeeded());
        assert_eq!(store.get(&ids[0]).unwrap().document().get("square"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn test_failing_function_does_not_persist() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = open(store.as_ref(), &[json!({"n": 1})]);
        let registry = Registry::builder()
            .operation(Operation::function("half_done", |job| {
                job.document_mut().insert("partial", json!(true));
                anyhow::bail!("ran out of patience")
            }))
            .unwrap()
            .build()
            .unwrap();

        let units = schedule(registry, Arc::clone(&store), &ids);
        let outcomes = Executor::new(Arc::clone(&store), ExecutorConfig::default())
            .execute(units)
            .await
            .unwrap();

        assert_eq!(outcomes[0].state, UnitState::Failed);
        let err = outcomes[0].error.as_ref().unwrap();
        assert!(err.to_string().contains("ran out of patience"));
        assert!(store.get(&ids[0]).unwrap().document().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_fails_without_persisting() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = open(store.as_ref(), &[json!({"slow": true})]);
        let registry = Registry::builder()
            .operation(Operation::function("slow", |job| {
                std::thread::sleep(Duration::from_millis(300));
                job.document_mut().insert("finished", json!(true));
                Ok(())
            }))
            .unwrap()
            .build()
            .unwrap();

        let units = schedule(registry, Arc::clone(&store), &ids);
        let config = ExecutorConfig::default().with_timeout(Some(Duration::from_millis(20)));
        let outcomes = Executor::new(Arc::clone(&store), config)
            .execute(units)
            .await
            .unwrap();

        assert_eq!(outcomes[0].state, UnitState::Failed);
        assert!(outcomes[0].error.as_ref().unwrap().to_string().contains("timed out"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.get(&ids[0]).unwrap().document().get("finished").is_none());
    }

    #[tokio::test]
    async fn test_same_job_never_overlaps() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = open(store.as_ref(), &[json!({"i": 1}), json!({"i": 2})]);
        let spans: Arc<Mutex<Vec<(JobId, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut builder = Registry::builder();
        for name in ["first", "second", "third"] {
            let spans = Arc::clone(&spans);
            builder
                .register_operation(Operation::function(name, move |job| {
                    let start = Instant::now();
                    std::thread::sleep(Duration::from_millis(40));
                    spans.lock().unwrap().push((job.id(), start, Instant::now()));
                    Ok(())
                }))
                .unwrap();
        }
        let units = schedule(builder.build().unwrap(), Arc::clone(&store), &ids);
        assert_eq!(units.len(), 6);

        let config = ExecutorConfig::default().with_max_parallel(4);
        let outcomes = Executor::new(Arc::clone(&store), config)
            .execute(units)
            .await
            .unwrap();
        assert!(outcomes.iter().all(UnitOutcome::succeeded));

        let spans = spans.lock().unwrap().clone();
        let overlaps = |a: &(JobId, Instant, Instant), b: &(JobId, Instant, Instant)| {
            a.1 < b.2 && b.1 < a.2
        };
        let mut cross_job_overlap = false;
        for (i, a) in spans.iter().enumerate() {
            for b in &spans[i + 1..] {
                if a.0 == b.0 {
                    assert!(!overlaps(a, b), "same-job invocations overlapped");
                } else if overlaps(a, b) {
                    cross_job_overlap = true;
                }
            }
        }
        assert!(cross_job_overlap, "different jobs should run in parallel");
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = open(store.as_ref(), &[json!({"i": 1}), json!({"i": 2})]);
        let registry = Registry::builder()
            .operation(Operation::function("a", |_| Ok(())))
            .unwrap()
            .operation(Operation::function("b", |_| Ok(())))
            .unwrap()
            .build()
            .unwrap();
        let units = schedule(registry, Arc::clone(&store), &ids);
        let expected: Vec<(JobId, String)> =
            units.iter().map(|u| (u.job, u.operation.clone())).collect();

        let outcomes = Executor::new(Arc::clone(&store), ExecutorConfig::default().with_max_parallel(2))
            .execute(units)
            .await
            .unwrap();
        let got: Vec<(JobId, String)> = outcomes.iter().map(|o| (o.job, o.operation.clone())).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_shell_command_runs_in_job_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(DirectoryStore::open(dir.path().join("workspace")).unwrap());
        let ids = open(store.as_ref(), &[json!({"name": "alpha"})]);
        let registry = Registry::builder()
            .operation(Operation::command("touch", "echo {sp.name} > out.txt").with_job(true))
            .unwrap()
            .build()
            .unwrap();

        let units = schedule(registry, Arc::clone(&store), &ids);
        let config = ExecutorConfig::default().with_project_root(dir.path());
        let outcomes = Executor::new(Arc::clone(&store), config)
            .execute(units)
            .await
            .unwrap();

        assert!(outcomes[0].succeeded(), "{:?}", outcomes[0].error);
        let job = store.get(&ids[0]).unwrap();
        assert!(job.is_file("out.txt"));
        let text = std::fs::read_to_string(job.fn_path("out.txt")).unwrap();
        assert_eq!(text.trim(), "alpha");
    }

    #[tokio::test]
    async fn test_shell_failure_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new(dir.path()));
        let ids = open(store.as_ref(), &[json!({})]);
        let registry = Registry::builder()
            .operation(Operation::command("fails", "exit 3"))
            .unwrap()
            .operation(Operation::command("hangs", "sleep 5"))
            .unwrap()
            .build()
            .unwrap();

        let units = schedule(registry, Arc::clone(&store), &ids);
        let config = ExecutorConfig::default()
            .with_project_root(dir.path())
            .with_timeout(Some(Duration::from_millis(200)));
        let outcomes = Executor::new(Arc::clone(&store), config)
            .execute(units)
            .await
            .unwrap();

        let reason = |o: &UnitOutcome| o.error.as_ref().map(ToString::to_string).unwrap_or_default();
        assert_eq!(outcomes[0].state, UnitState::Failed);
        assert!(reason(&outcomes[0]).contains("exit status 3"));
        assert_eq!(outcomes[1].state, UnitState::Failed);
        assert!(reason(&outcomes[1]).contains("timed out"));
        assert!(outcomes[1].duration() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_job_is_fatal() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = open(store.as_ref(), &[json!({"i": 1})]);
        let registry = Registry::builder()
            .operation(Operation::function("a", |_| Ok(())))
            .unwrap()
            .build()
            .unwrap();
        let units = schedule(registry, Arc::clone(&store), &ids);

        let empty: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let result = Executor::new(empty, ExecutorConfig::default()).execute(units).await;
        assert!(result.is_err());
    }
}
