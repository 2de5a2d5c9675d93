//! Group composition: which operations a request covers, in what order,
//! and under which groups.

use crate::error::PlanResult;
use crate::group::Group;
use crate::operation::Operation;
use crate::registry::Registry;
use indexmap::IndexSet;

/// What a run request asks for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    /// Every operation; every group is applicable
    #[default]
    All,
    /// Named operations; no group is applicable
    Operations(Vec<String>),
    /// Named groups; only their members run
    Groups(Vec<String>),
}

impl Scope {
    /// Scope over named operations
    pub fn operations<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Operations(names.into_iter().map(Into::into).collect())
    }

    /// Scope over named groups
    pub fn groups<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Groups(names.into_iter().map(Into::into).collect())
    }
}

/// One operation a request will consider, with its execution context
#[derive(Debug, Clone)]
pub struct PlannedOperation<'r> {
    /// The operation
    pub operation: &'r Operation,
    /// Applicable groups, in registration order
    pub candidates: Vec<&'r Group>,
    primary: Option<&'r Group>,
}

impl<'r> PlannedOperation<'r> {
    fn new(operation: &'r Operation, candidates: Vec<&'r Group>, primary: Option<&'r Group>) -> Self {
        Self {
            operation,
            candidates,
            primary,
        }
    }

    /// The group the operation executes under: the first one the request
    /// reaches
    #[must_use]
    pub fn group(&self) -> Option<&'r Group> {
        self.primary
    }
}

/// Maps requests onto registered groups
pub struct GroupComposer<'r> {
    registry: &'r Registry,
}

impl<'r> GroupComposer<'r> {
    /// Create a composer over a registry
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Groups applicable to an operation under a request, in registration order
    ///
    /// A group applies when the request names it (or is `All`) and the
    /// operation is a member.
    #[must_use]
    pub fn applicable_groups(&self, operation: &str, scope: &Scope) -> Vec<&'r Group> {
        match scope {
            Scope::All => self.registry.groups_containing(operation),
            Scope::Operations(_) => Vec::new(),
            Scope::Groups(names) => self
                .registry
                .groups_containing(operation)
                .into_iter()
                .filter(|g| names.iter().any(|n| n == g.name()))
                .collect(),
        }
    }

    /// Ordered operations a request covers
    ///
    /// `All` follows operation registration order; `Operations` follows
    /// request order; `Groups` walks groups in request order and members in
    /// registration order. Each operation appears once; with several
    /// candidate groups it executes at the first group that reaches it.
    /// Operations outside every requested group are excluded.
    ///
    /// # Errors
    ///
    /// Returns error if the request names an unknown operation or group
    pub fn plan(&self, scope: &Scope) -> PlanResult<Vec<PlannedOperation<'r>>> {
        match scope {
            Scope::All => Ok(self
                .registry
                .operations()
                .map(|operation| {
                    let candidates = self.registry.groups_containing(operation.name());
                    let primary = candidates.first().copied();
                    PlannedOperation::new(operation, candidates, primary)
                })
                .collect()),
            Scope::Operations(names) => {
                let mut seen = IndexSet::new();
                let mut planned = Vec::new();
                for name in names {
                    let operation = self.registry.require_operation(name)?;
                    if seen.insert(name.as_str()) {
                        planned.push(PlannedOperation::new(operation, Vec::new(), None));
                    }
                }
                Ok(planned)
            }
            Scope::Groups(names) => {
                let requested = names
                    .iter()
                    .map(|name| self.registry.require_group(name))
                    .collect::<PlanResult<Vec<_>>>()?;

                let mut seen = IndexSet::new();
                let mut planned = Vec::new();
                for group in &requested {
                    for member in group.operations() {
                        if !seen.insert(member) {
                            continue;
                        }
                        let operation = self.registry.require_operation(member)?;
                        let candidates = self.applicable_groups(member, scope);
                        planned.push(PlannedOperation::new(operation, candidates, Some(*group)));
                    }
                }
                Ok(planned)
            }
        }
    }
}
