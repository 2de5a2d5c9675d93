//! Multi-pass run engine.
//!
//! Combines scheduler and executor: schedule, execute, and repeat while new
//! units become eligible. A (job, operation) pair is attempted at most once
//! per run, so a run always terminates.

use crate::error::RuntimeResult;
use crate::executor::{Executor, ExecutorConfig, UnitOutcome};
use crate::scheduler::{EligibilityScheduler, ForceSet};
use crate::summary::RunSummary;
use jobflow_core::JobId;
use jobflow_plan::{Registry, Scope};
use jobflow_store::JobStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Maximum scheduling passes; 0 means until nothing new is eligible
    pub num_passes: usize,
    /// Bypass conditions for every requested pair, first pass only
    pub force: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_passes: 1,
            force: false,
        }
    }
}

impl RunConfig {
    /// Set number of passes
    #[must_use]
    pub fn with_num_passes(mut self, passes: usize) -> Self {
        self.num_passes = passes;
        self
    }

    /// Set force flag
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Execution engine running requests to completion
pub struct RunEngine {
    scheduler: EligibilityScheduler,
    executor: Executor,
}

impl RunEngine {
    /// Create an engine
    #[must_use]
    pub fn new(registry: Arc<Registry>, store: Arc<dyn JobStore>, config: ExecutorConfig) -> Self {
        Self {
            scheduler: EligibilityScheduler::new(registry, Arc::clone(&store)),
            executor: Executor::new(store, config),
        }
    }

    /// Scheduler in use
    #[must_use]
    pub fn scheduler(&self) -> &EligibilityScheduler {
        &self.scheduler
    }

    /// Executor in use
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run a request
    ///
    /// # Errors
    ///
    /// Returns error on store failure or an invalid request
    pub async fn run(&self, jobs: &[JobId], scope: &Scope, config: &RunConfig) -> RuntimeResult<RunSummary> {
        self.run_with(jobs, scope, config, &|_| {}).await
    }

    /// Run a request, reporting each outcome as it completes
    ///
    /// # Errors
    ///
    /// Returns error on store failure or an invalid request
    pub async fn run_with(
        &self,
        jobs: &[JobId],
        scope: &Scope,
        config: &RunConfig,
        on_outcome: &(dyn Fn(&UnitOutcome) + Sync),
    ) -> RuntimeResult<RunSummary> {
        let mut attempted: HashSet<(JobId, String)> = HashSet::new();
        let mut summary = RunSummary::new();
        let mut skipped = Vec::new();

        while config.num_passes == 0 || summary.passes < config.num_passes {
            let force = if summary.passes == 0 {
                ForceSet::from_flag(config.force)
            } else {
                ForceSet::None
            };
            let schedule = self.scheduler.schedule(jobs, scope, &force)?;
            summary.passes += 1;

            for err in schedule.failures {
                if attempted.insert((err.job(), err.operation().to_string())) {
                    summary.record(err);
                }
            }
            skipped = schedule.skipped;

            let units: Vec<_> = schedule
                .units
                .into_iter()
                .filter(|u| attempted.insert((u.job, u.operation.clone())))
                .collect();
            if units.is_empty() {
                break;
            }

            info!(pass = summary.passes, units = units.len(), "Pass started");
            for outcome in self.executor.execute_with(units, on_outcome).await? {
                summary.record(outcome);
            }
        }

        for evaluation in skipped {
            if !attempted.contains(&(evaluation.job, evaluation.operation.clone())) {
                summary.record(evaluation);
            }
        }

        info!(
            passes = summary.passes,
            executed = summary.executed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "Run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::UnitState;
    use jobflow_core::ParameterSet;
    use jobflow_plan::{Condition, Operation};
    use jobflow_store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline() -> Registry {
        Registry::builder()
            .operation(
                Operation::function("init", |job| {
                    job.document_mut().insert("initialized", json!(true));
                    Ok(())
                })
                .post(Condition::document_true("initialized")),
            )
            .unwrap()
            .operation(
                Operation::function("simulate", |job| {
                    job.document_mut().insert("simulated", json!(true));
                    Ok(())
                })
                .pre(Condition::after(["init"]))
                .post(Condition::document_true("simulated")),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    fn setup(registry: Registry, n: i64) -> (RunEngine, Arc<dyn JobStore>, Vec<JobId>) {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new("/ws"));
        let ids = (0..n)
            .map(|i| store.open_job(ParameterSet::from_value(json!({"i": i})).unwrap()).unwrap())
            .collect();
        let engine = RunEngine::new(
            Arc::new(registry),
            Arc::clone(&store),
            ExecutorConfig::default().with_max_parallel(2),
        );
        (engine, store, ids)
    }

    #[tokio::test]
    async fn test_single_pass_runs_only_initially_eligible() {
        let (engine, store, ids) = setup(pipeline(), 2);
        let summary = engine.run(&ids, &Scope::All, &RunConfig::default()).await.unwrap();

        assert_eq!(summary.passes, 1);
        assert_eq!(summary.executed(), 2);
        assert_eq!(summary.skipped(), 2);
        assert!(summary.is_success());
        for id in &ids {
            let doc = store.get(id).unwrap();
            assert_eq!(doc.document().get("initialized"), Some(&json!(true)));
            assert!(doc.document().get("simulated").is_none());
        }
    }

    #[tokio::test]
    async fn test_multiple_passes_follow_dependencies() {
        let (engine, store, ids) = setup(pipeline(), 3);
        let config = RunConfig::default().with_num_passes(0);
        let summary = engine.run(&ids, &Scope::All, &config).await.unwrap();

        assert_eq!(summary.executed(), 6);
        assert_eq!(summary.skipped(), 0);
        // init, simulate, then an empty pass
        assert_eq!(summary.passes, 3);
        for id in &ids {
            assert_eq!(store.get(id).unwrap().document().get("simulated"), Some(&json!(true)));
        }
    }

    #[tokio::test]
    async fn test_never_condition_runs_once_per_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Registry::builder()
            .operation(
                Operation::function("debug", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .post(Condition::Never),
            )
            .unwrap()
            .build()
            .unwrap();
        let (engine, _store, ids) = setup(registry, 1);

        let summary = engine
            .run(&ids, &Scope::All, &RunConfig::default().with_num_passes(0))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.executed(), 1);
    }

    #[tokio::test]
    async fn test_force_reruns_complete_operation() {
        let (engine, _store, ids) = setup(pipeline(), 1);
        let scope = Scope::operations(["init"]);
        engine.run(&ids, &scope, &RunConfig::default()).await.unwrap();

        let again = engine.run(&ids, &scope, &RunConfig::default()).await.unwrap();
        assert_eq!(again.executed(), 0);
        assert_eq!(again.skipped(), 1);

        let forced = engine
            .run(&ids, &scope, &RunConfig::default().with_force(true))
            .await
            .unwrap();
        assert_eq!(forced.executed(), 1);
        assert!(forced.reports[0].forced);
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_others_continue() {
        let registry = Registry::builder()
            .operation(Operation::function("flaky", |job| {
                if job.statepoint().get("i") == Some(&json!(0)) {
                    anyhow::bail!("bad input");
                }
                Ok(())
            }))
            .unwrap()
            .build()
            .unwrap();
        let (engine, _store, ids) = setup(registry, 3);
        let summary = engine.run(&ids, &Scope::All, &RunConfig::default()).await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.executed(), 2);
        let failure = summary.failures().next().unwrap();
        assert_eq!(failure.state, UnitState::Failed);
        assert!(failure.error.as_ref().unwrap().to_string().contains("bad input"));
    }
}
