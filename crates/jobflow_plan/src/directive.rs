//! Directive sets.
//!
//! Directives are opaque name/value hints (resource counts, executables,
//! extra flags). The planner only knows how to merge them: later writers
//! win, except run-option strings, which concatenate.

use indexmap::IndexMap;
use jobflow_core::Job;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Directive naming the interpreter/prefix for command operations
pub const EXECUTABLE: &str = "executable";

/// Conventional resource-count directive
pub const NP: &str = "np";

/// Extra flags forwarded to the invoking process
pub const RUN_OPTIONS: &str = "run_options";

/// Job-dependent directive function
pub type DirectiveFn = Arc<dyn Fn(&Job) -> anyhow::Result<Value> + Send + Sync>;

/// A directive value before resolution
#[derive(Clone)]
pub enum DirectiveValue {
    /// Same value for every job
    Constant(Value),
    /// Computed per job after merging
    Computed(DirectiveFn),
    /// Option string; merging concatenates with a single space
    Options(String),
}

impl DirectiveValue {
    /// Merge `other` on top of `self`
    fn merged(&self, other: &DirectiveValue) -> DirectiveValue {
        match (self, other) {
            (Self::Options(a), Self::Options(b)) => Self::Options(join_options(a, b)),
            _ => other.clone(),
        }
    }
}

impl fmt::Debug for DirectiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "Constant({v})"),
            Self::Computed(_) => write!(f, "Computed(..)"),
            Self::Options(s) => write!(f, "Options({s:?})"),
        }
    }
}

impl From<Value> for DirectiveValue {
    fn from(value: Value) -> Self {
        Self::Constant(value)
    }
}

fn join_options(a: &str, b: &str) -> String {
    match (a.trim(), b.trim()) {
        ("", b) => b.to_string(),
        (a, "") => a.to_string(),
        (a, b) => format!("{a} {b}"),
    }
}

/// Ordered set of unresolved directives
#[derive(Debug, Clone, Default)]
pub struct Directives {
    entries: IndexMap<String, DirectiveValue>,
}

impl Directives {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from constant values
    #[must_use]
    pub fn from_constants(values: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: values
                .into_iter()
                .map(|(k, v)| (k, DirectiveValue::Constant(v)))
                .collect(),
        }
    }

    /// Set a constant directive
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(name.into(), DirectiveValue::Constant(value.into()));
        self
    }

    /// Set a job-dependent directive
    #[must_use]
    pub fn computed<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Job) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.entries
            .insert(name.into(), DirectiveValue::Computed(Arc::new(f)));
        self
    }

    /// Set the run-option string
    #[must_use]
    pub fn with_run_options(mut self, options: impl Into<String>) -> Self {
        self.entries
            .insert(RUN_OPTIONS.to_string(), DirectiveValue::Options(options.into()));
        self
    }

    /// Insert a raw value
    pub fn insert(&mut self, name: impl Into<String>, value: DirectiveValue) {
        self.entries.insert(name.into(), value);
    }

    /// Overlay `other`: last writer wins, option strings concatenate
    pub fn merge(&mut self, other: &Directives) {
        for (name, value) in &other.entries {
            let merged = match self.entries.get(name) {
                Some(existing) => existing.merged(value),
                None => value.clone(),
            };
            self.entries.insert(name.clone(), merged);
        }
    }

    /// Get an unresolved value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DirectiveValue> {
        self.entries.get(name)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DirectiveValue)> {
        self.entries.iter()
    }

    /// Number of directives
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Directives evaluated against one job, ready for execution or templating
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedDirectives {
    values: IndexMap<String, Value>,
}

impl ResolvedDirectives {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resolved value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Get a value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a string value
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Non-empty executable prefix
    #[must_use]
    pub fn executable(&self) -> Option<&str> {
        self.get_str(EXECUTABLE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Non-empty run-option string
    #[must_use]
    pub fn run_options(&self) -> Option<&str> {
        self.get_str(RUN_OPTIONS)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Resource count; defaults to 1 when absent or not a positive integer
    #[must_use]
    pub fn np(&self) -> u64 {
        self.values
            .get(NP)
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    /// Iterate in merge order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of directives
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_last_writer_wins() {
        let mut base = Directives::new().with(NP, 1).with("walltime", 2);
        base.merge(&Directives::new().with(NP, 4));
        assert!(matches!(base.get(NP), Some(DirectiveValue::Constant(v)) if *v == json!(4)));
        assert!(base.get("walltime").is_some());
        // Insertion position of the original key is kept
        assert_eq!(base.iter().next().unwrap().0, NP);
    }

    #[test]
    fn test_merge_concatenates_options() {
        let mut base = Directives::new().with_run_options("--debug");
        base.merge(&Directives::new().with_run_options("--verbose"));
        assert!(
            matches!(base.get(RUN_OPTIONS), Some(DirectiveValue::Options(s)) if s == "--debug --verbose")
        );
    }

    #[test]
    fn test_merge_options_skips_empty() {
        let mut base = Directives::new().with_run_options("");
        base.merge(&Directives::new().with_run_options("  -x "));
        assert!(matches!(base.get(RUN_OPTIONS), Some(DirectiveValue::Options(s)) if s == "-x"));
    }

    #[test]
    fn test_constant_overwrites_options() {
        let mut base = Directives::new().with_run_options("--debug");
        base.merge(&Directives::new().with(RUN_OPTIONS, "--replaced"));
        assert!(matches!(base.get(RUN_OPTIONS), Some(DirectiveValue::Constant(_))));
    }

    #[test]
    fn test_resolved_accessors() {
        let mut resolved = ResolvedDirectives::new();
        assert_eq!(resolved.np(), 1);
        assert_eq!(resolved.executable(), None);

        resolved.insert(NP, json!(8));
        resolved.insert(EXECUTABLE, json!("  "));
        resolved.insert(RUN_OPTIONS, json!("--fast"));
        assert_eq!(resolved.np(), 8);
        assert_eq!(resolved.executable(), None);
        assert_eq!(resolved.run_options(), Some("--fast"));

        resolved.insert(NP, json!("many"));
        assert_eq!(resolved.np(), 1);
    }

    #[test]
    fn test_resolved_serializes_as_map() {
        let mut resolved = ResolvedDirectives::new();
        resolved.insert(NP, json!(2));
        resolved.insert("walltime", json!(1.5));
        assert_eq!(
            serde_json::to_string(&resolved).unwrap(),
            r#"{"np":2,"walltime":1.5}"#
        );
    }
}
