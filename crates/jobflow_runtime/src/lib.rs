//! Jobflow Runtime
//!
//! Turns a registry and a job store into work: evaluates conditions,
//! schedules eligible (job, operation) units in a stable order, executes
//! them with per-job serialization, and bundles them for submission.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod eligibility;
pub mod engine;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod submit;
pub mod summary;

pub use eligibility::{ConditionEngine, Eligibility};
pub use engine::{RunConfig, RunEngine};
pub use error::{ConditionPhase, RuntimeError, RuntimeResult, UnitError};
pub use executor::{Executor, ExecutorConfig, UnitOutcome};
pub use scheduler::{EligibilityScheduler, Evaluation, ForceSet, Schedule, ScheduledUnit, UnitState};
pub use submit::{ScriptTemplate, ShellScriptTemplate, Submission, SubmissionEntry};
pub use summary::{RunSummary, UnitReport};
