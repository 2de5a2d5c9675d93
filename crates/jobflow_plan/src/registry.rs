//! Operation and group registry.
//!
//! Registration happens on a [`RegistryBuilder`]; `build` validates the
//! cross references and freezes everything into an immutable
//! [`Registry`] that the scheduler shares by `Arc`. There is no global
//! registry.

use crate::error::{PlanError, PlanResult};
use crate::group::Group;
use crate::operation::Operation;
use indexmap::IndexMap;
use tracing::debug;

/// Mutable registration phase
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    operations: IndexMap<String, Operation>,
    groups: IndexMap<String, Group>,
}

impl RegistryBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation
    ///
    /// # Errors
    ///
    /// Returns error if the name is already taken
    pub fn register_operation(&mut self, operation: Operation) -> PlanResult<()> {
        let name = operation.name().to_string();
        if self.operations.contains_key(&name) {
            return Err(PlanError::DuplicateOperation { name });
        }
        if self.groups.contains_key(&name) {
            return Err(PlanError::NameClash { name });
        }
        self.operations.insert(name, operation);
        Ok(())
    }

    /// Register a group
    ///
    /// # Errors
    ///
    /// Returns error if the name is already taken
    pub fn register_group(&mut self, group: Group) -> PlanResult<()> {
        let name = group.name().to_string();
        if self.groups.contains_key(&name) {
            return Err(PlanError::DuplicateGroup { name });
        }
        if self.operations.contains_key(&name) {
            return Err(PlanError::NameClash { name });
        }
        self.groups.insert(name, group);
        Ok(())
    }

    /// Builder-style operation registration
    ///
    /// # Errors
    ///
    /// Returns error if the name is already taken
    pub fn operation(mut self, operation: Operation) -> PlanResult<Self> {
        self.register_operation(operation)?;
        Ok(self)
    }

    /// Builder-style group registration
    ///
    /// # Errors
    ///
    /// Returns error if the name is already taken
    pub fn group(mut self, group: Group) -> PlanResult<Self> {
        self.register_group(group)?;
        Ok(self)
    }

    /// Validate and freeze
    ///
    /// # Errors
    ///
    /// Returns error if a group member or `after` target is not registered
    pub fn build(self) -> PlanResult<Registry> {
        for group in self.groups.values() {
            for member in group.operations() {
                if !self.operations.contains_key(member) {
                    return Err(PlanError::UnknownMember {
                        group: group.name().to_string(),
                        operation: member.to_string(),
                    });
                }
            }
        }

        for operation in self.operations.values() {
            let conditions = operation
                .pre_conditions()
                .iter()
                .chain(operation.post_conditions());
            for condition in conditions {
                for target in condition.dependencies() {
                    if !self.operations.contains_key(target) {
                        return Err(PlanError::UnknownDependency {
                            operation: operation.name().to_string(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        debug!(
            operations = self.operations.len(),
            groups = self.groups.len(),
            "Registry built"
        );

        Ok(Registry {
            operations: self.operations,
            groups: self.groups,
        })
    }
}

/// Immutable registry of operations and groups
#[derive(Debug)]
pub struct Registry {
    operations: IndexMap<String, Operation>,
    groups: IndexMap<String, Group>,
}

impl Registry {
    /// Start a new registration
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up an operation
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Look up a group
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Look up an operation, failing if absent
    ///
    /// # Errors
    ///
    /// Returns error if the operation is not registered
    pub fn require_operation(&self, name: &str) -> PlanResult<&Operation> {
        self.operation(name).ok_or_else(|| PlanError::UnknownOperation {
            name: name.to_string(),
        })
    }

    /// Look up a group, failing if absent
    ///
    /// # Errors
    ///
    /// Returns error if the group is not registered
    pub fn require_group(&self, name: &str) -> PlanResult<&Group> {
        self.group(name).ok_or_else(|| PlanError::UnknownGroup {
            name: name.to_string(),
        })
    }

    /// Operations in registration order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Groups in registration order
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Groups containing an operation, in registration order
    #[must_use]
    pub fn groups_containing(&self, operation: &str) -> Vec<&Group> {
        self.groups
            .values()
            .filter(|g| g.contains(operation))
            .collect()
    }

    /// Number of operations
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Number of groups
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
