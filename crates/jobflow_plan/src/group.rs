//! Execution-context groups.

use crate::directive::Directives;
use indexmap::IndexMap;
use serde_json::Value;

/// A named execution context: member operations with local overrides,
/// group-level default directives, and run options
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    /// Member operation -> operation-specific override, in registration order
    members: IndexMap<String, Directives>,
    /// Group defaults (run options live here under `run_options`)
    directives: Directives,
}

impl Group {
    /// Create an empty group
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: IndexMap::new(),
            directives: Directives::new(),
        }
    }

    /// Add a member with no local override
    #[must_use]
    pub fn add_operation(self, operation: impl Into<String>) -> Self {
        self.add_operation_with(operation, Directives::new())
    }

    /// Add a member with an operation-specific override
    ///
    /// Re-adding a member replaces its override but keeps its position.
    #[must_use]
    pub fn add_operation_with(mut self, operation: impl Into<String>, overrides: Directives) -> Self {
        self.members.insert(operation.into(), overrides);
        self
    }

    /// Set a group-level default directive
    #[must_use]
    pub fn with_directive(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.directives = self.directives.with(name, value);
        self
    }

    /// Overlay group-level default directives
    #[must_use]
    pub fn with_directives(mut self, directives: Directives) -> Self {
        self.directives.merge(&directives);
        self
    }

    /// Set the group's run options
    ///
    /// Options are appended to command operations and to the `exec` line
    /// that re-enters a function operation.
    #[must_use]
    pub fn with_run_options(mut self, options: impl Into<String>) -> Self {
        self.directives = self.directives.with_run_options(options);
        self
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.members.contains_key(operation)
    }

    /// Member operations in registration order
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Operation-specific override
    #[must_use]
    pub fn override_for(&self, operation: &str) -> Option<&Directives> {
        self.members.get(operation)
    }

    /// Group-level default directives
    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the group has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
