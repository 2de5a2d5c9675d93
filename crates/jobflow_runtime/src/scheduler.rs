//! Eligibility scheduling.
//!
//! The scheduler is a thin, deterministic coordinator:
//! - Jobs are visited in ascending id order
//! - Within a job, operations follow [`GroupComposer`] order
//! - Each (job, operation) pair is evaluated independently; a failing pair
//!   never stops the others
//! - Only store failures abort the batch

use crate::eligibility::{ConditionEngine, Eligibility};
use crate::error::{RuntimeResult, UnitError};
use jobflow_core::{Job, JobId};
use jobflow_plan::{
    CommandGenerator, DirectiveResolver, GroupComposer, Invocation, PlannedOperation, Registry,
    ResolvedDirectives, Scope,
};
use jobflow_store::JobStore;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of one (job, operation) pair
///
/// `Pending` → `Eligible | Blocked | Ineligible` → `Executed | Skipped | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Not yet evaluated
    Pending,
    /// Will run
    Eligible,
    /// A pre-condition does not hold
    Blocked,
    /// Already complete
    Ineligible,
    /// Ran to completion
    Executed,
    /// Not run
    Skipped,
    /// Evaluation, materialization, or execution failed
    Failed,
}

impl UnitState {
    /// State after condition evaluation
    #[must_use]
    pub const fn evaluated(eligibility: Eligibility) -> Self {
        match eligibility {
            Eligibility::Eligible | Eligibility::Forced => Self::Eligible,
            Eligibility::Blocked { .. } => Self::Blocked,
            Eligibility::Ineligible { .. } => Self::Ineligible,
        }
    }

    /// Terminal state once the pair has been handled
    ///
    /// Eligible pairs become `Executed` or `Failed`; blocked and ineligible
    /// pairs become `Skipped`. Terminal states do not move.
    #[must_use]
    pub const fn finish(self, succeeded: bool) -> Self {
        match self {
            Self::Pending | Self::Eligible => {
                if succeeded {
                    Self::Executed
                } else {
                    Self::Failed
                }
            }
            Self::Blocked | Self::Ineligible => Self::Skipped,
            terminal => terminal,
        }
    }

    /// Whether the state is final
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Eligible => "eligible",
            Self::Blocked => "blocked",
            Self::Ineligible => "complete",
            Self::Executed => "executed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Which (job, operation) pairs bypass condition evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForceSet {
    /// Nothing is forced
    #[default]
    None,
    /// Every pair in the request is forced
    All,
    /// Only these pairs
    Pairs(BTreeSet<(JobId, String)>),
}

impl ForceSet {
    /// Force or not every requested pair
    #[must_use]
    pub fn from_flag(force: bool) -> Self {
        if force { Self::All } else { Self::None }
    }

    /// Add a single forced pair
    #[must_use]
    pub fn with(self, job: JobId, operation: impl Into<String>) -> Self {
        let mut pairs = match self {
            Self::Pairs(pairs) => pairs,
            Self::None => BTreeSet::new(),
            Self::All => return Self::All,
        };
        pairs.insert((job, operation.into()));
        Self::Pairs(pairs)
    }

    /// Check whether a pair is forced
    #[must_use]
    pub fn contains(&self, job: JobId, operation: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Pairs(pairs) => pairs
                .iter()
                .any(|(j, op)| *j == job && op == operation),
        }
    }
}

/// Evaluation of one (job, operation) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Job id
    pub job: JobId,
    /// Operation name
    pub operation: String,
    /// Group the operation runs under, if any
    pub group: Option<String>,
    /// Condition outcome or the error raised while evaluating
    pub outcome: Result<Eligibility, UnitError>,
}

impl Evaluation {
    /// State after evaluation
    #[must_use]
    pub fn state(&self) -> UnitState {
        match &self.outcome {
            Ok(eligibility) => UnitState::evaluated(*eligibility),
            Err(_) => UnitState::Failed,
        }
    }
}

/// An eligible pair, ready to execute
#[derive(Debug, Clone)]
pub struct ScheduledUnit {
    /// Job id
    pub job: JobId,
    /// Operation name
    pub operation: String,
    /// Group the operation runs under, if any
    pub group: Option<String>,
    /// Directives resolved for this job and group
    pub directives: ResolvedDirectives,
    /// What to execute
    pub invocation: Invocation,
    /// Whether conditions were bypassed
    pub forced: bool,
}

/// Result of a scheduling pass
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Eligible units in execution order
    pub units: Vec<ScheduledUnit>,
    /// Pairs that failed before execution
    pub failures: Vec<UnitError>,
    /// Pairs that were blocked or already complete
    pub skipped: Vec<Evaluation>,
}

impl Schedule {
    /// Check if nothing is runnable
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Computes which (job, operation) units are currently eligible
pub struct EligibilityScheduler {
    registry: Arc<Registry>,
    store: Arc<dyn JobStore>,
    resolver: DirectiveResolver,
    generator: CommandGenerator,
}

impl EligibilityScheduler {
    /// Create a scheduler
    #[must_use]
    pub fn new(registry: Arc<Registry>, store: Arc<dyn JobStore>) -> Self {
        Self {
            registry,
            store,
            resolver: DirectiveResolver::new(),
            generator: CommandGenerator::new(),
        }
    }

    /// Registry in use
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Store in use
    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Evaluate every requested pair, runnable or not
    ///
    /// # Errors
    ///
    /// Returns error if the request names unknown operations or groups, or
    /// if a job cannot be read
    pub fn evaluate(
        &self,
        jobs: &[JobId],
        scope: &Scope,
        force: &ForceSet,
    ) -> RuntimeResult<Vec<Evaluation>> {
        let plan = GroupComposer::new(&self.registry).plan(scope)?;
        let engine = ConditionEngine::new(&self.registry);
        let mut evaluations = Vec::new();

        for id in sorted(jobs) {
            let job = self.store.get(&id)?;
            for planned in &plan {
                evaluations.push(self.evaluate_pair(&engine, &job, planned, force));
            }
        }
        Ok(evaluations)
    }

    /// Ordered units that are currently eligible
    ///
    /// Pairs whose conditions, directives, or command fail are collected in
    /// [`Schedule::failures`] and do not affect the rest.
    ///
    /// # Errors
    ///
    /// Returns error if the request names unknown operations or groups, or
    /// if a job cannot be read
    pub fn schedule(&self, jobs: &[JobId], scope: &Scope, force: &ForceSet) -> RuntimeResult<Schedule> {
        let plan = GroupComposer::new(&self.registry).plan(scope)?;
        let engine = ConditionEngine::new(&self.registry);
        let mut schedule = Schedule::default();

        for id in sorted(jobs) {
            let job = self.store.get(&id)?;
            for planned in &plan {
                let evaluation = self.evaluate_pair(&engine, &job, planned, force);
                match evaluation.outcome {
                    Ok(eligibility) if eligibility.is_runnable() => {
                        match self.prepare(&job, planned, eligibility) {
                            Ok(unit) => schedule.units.push(unit),
                            Err(err) => {
                                warn!(job = %id, operation = planned.operation.name(), error = %err, "Unit failed");
                                schedule.failures.push(err);
                            }
                        }
                    }
                    Ok(_) => schedule.skipped.push(evaluation),
                    Err(err) => {
                        warn!(job = %id, operation = planned.operation.name(), error = %err, "Unit failed");
                        schedule.failures.push(err);
                    }
                }
            }
        }

        info!(
            jobs = jobs.len(),
            eligible = schedule.units.len(),
            failed = schedule.failures.len(),
            skipped = schedule.skipped.len(),
            "Schedule computed"
        );
        Ok(schedule)
    }

    fn evaluate_pair(
        &self,
        engine: &ConditionEngine<'_>,
        job: &Job,
        planned: &PlannedOperation<'_>,
        force: &ForceSet,
    ) -> Evaluation {
        let operation = planned.operation.name();
        let outcome = if force.contains(job.id(), operation) {
            Ok(Eligibility::Forced)
        } else {
            engine.eligible(job, planned.operation)
        };
        if let Ok(eligibility) = &outcome {
            debug!(job = %job.id(), operation, %eligibility, "Evaluated");
        }
        Evaluation {
            job: job.id(),
            operation: operation.to_string(),
            group: planned.group().map(|g| g.name().to_string()),
            outcome,
        }
    }

    fn prepare(
        &self,
        job: &Job,
        planned: &PlannedOperation<'_>,
        eligibility: Eligibility,
    ) -> Result<ScheduledUnit, UnitError> {
        let groups: Vec<_> = planned.group().into_iter().collect();
        let directives = self.resolver.resolve(planned.operation, &groups, job)?;
        let invocation = self.generator.materialize(planned.operation, &directives, job)?;
        Ok(ScheduledUnit {
            job: job.id(),
            operation: planned.operation.name().to_string(),
            group: planned.group().map(|g| g.name().to_string()),
            directives,
            invocation,
            forced: eligibility == Eligibility::Forced,
        })
    }
}

fn sorted(jobs: &[JobId]) -> BTreeSet<JobId> {
    jobs.iter().copied().collect()
}
