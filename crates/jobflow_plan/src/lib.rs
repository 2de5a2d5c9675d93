//! Jobflow Planner
//!
//! Explicit registration of operations, conditions, and groups, plus the
//! pure planning steps that turn a registration into something runnable:
//! group composition, directive resolution, and command materialization.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod compose;
pub mod condition;
pub mod directive;
pub mod error;
pub mod group;
pub mod operation;
pub mod registry;
pub mod resolve;

pub use command::{CommandGenerator, Invocation};
pub use compose::{GroupComposer, PlannedOperation, Scope};
pub use condition::{Condition, Predicate};
pub use directive::{DirectiveFn, DirectiveValue, Directives, ResolvedDirectives};
pub use error::{DirectiveError, MaterializeError, PlanError, PlanResult};
pub use group::Group;
pub use operation::{Operation, OperationBody, OperationFn, OperationKind};
pub use registry::{Registry, RegistryBuilder};
pub use resolve::DirectiveResolver;
