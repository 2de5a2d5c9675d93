//! Per-run reporting.

use crate::error::UnitError;
use crate::executor::UnitOutcome;
use crate::scheduler::{Evaluation, UnitState};
use jobflow_core::JobId;
use std::fmt;
use std::time::Duration;

/// Final state of one (job, operation) pair in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// Job id
    pub job: JobId,
    /// Operation name
    pub operation: String,
    /// Group the operation ran under
    pub group: Option<String>,
    /// Terminal state
    pub state: UnitState,
    /// Failure, if any
    pub error: Option<UnitError>,
    /// Whether conditions were bypassed
    pub forced: bool,
    /// Execution time, for executed or failed invocations
    pub duration: Option<Duration>,
}

impl From<UnitOutcome> for UnitReport {
    fn from(outcome: UnitOutcome) -> Self {
        let duration = Some(outcome.duration());
        Self {
            job: outcome.job,
            operation: outcome.operation,
            group: outcome.group,
            state: outcome.state,
            error: outcome.error,
            forced: outcome.forced,
            duration,
        }
    }
}

impl From<UnitError> for UnitReport {
    fn from(error: UnitError) -> Self {
        Self {
            job: error.job(),
            operation: error.operation().to_string(),
            group: None,
            state: UnitState::Failed,
            error: Some(error),
            forced: false,
            duration: None,
        }
    }
}

impl From<Evaluation> for UnitReport {
    fn from(evaluation: Evaluation) -> Self {
        let state = evaluation.state().finish(false);
        Self {
            job: evaluation.job,
            operation: evaluation.operation,
            group: evaluation.group,
            state,
            error: evaluation.outcome.err(),
            forced: false,
            duration: None,
        }
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Reports in the order units finished their lifecycle
    pub reports: Vec<UnitReport>,
    /// Scheduling passes performed
    pub passes: usize,
}

impl RunSummary {
    /// Create an empty summary
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report
    pub fn record(&mut self, report: impl Into<UnitReport>) {
        self.reports.push(report.into());
    }

    fn count(&self, state: UnitState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    /// Units that ran to completion
    #[must_use]
    pub fn executed(&self) -> usize {
        self.count(UnitState::Executed)
    }

    /// Units that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(UnitState::Failed)
    }

    /// Units not run
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(UnitState::Skipped)
    }

    /// Failed reports
    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.reports.iter().filter(|r| r.state == UnitState::Failed)
    }

    /// True if no unit failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Sum of execution times
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.reports.iter().filter_map(|r| r.duration).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executed, {} failed, {} skipped in {} pass{}",
            self.executed(),
            self.failed(),
            self.skipped(),
            self.passes,
            if self.passes == 1 { "" } else { "es" }
        )
    }
}
