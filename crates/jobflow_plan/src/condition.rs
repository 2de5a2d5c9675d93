//! Pre- and post-conditions.
//!
//! A condition is a side-effect-free predicate over a job. Built-in forms
//! cover the common checks; anything else is a labelled closure.

use jobflow_core::Job;
use jobflow_core::params::is_truthy;
use std::fmt;
use std::sync::Arc;

/// Closure form of a condition
pub type Predicate = Arc<dyn Fn(&Job) -> anyhow::Result<bool> + Send + Sync>;

/// A predicate over a job
#[derive(Clone)]
pub enum Condition {
    /// Arbitrary labelled predicate
    Predicate {
        /// Name shown in status output and errors
        label: String,
        /// The predicate
        predicate: Predicate,
    },
    /// Always false; as a post-condition the operation never completes
    Never,
    /// Document value at a dotted path is truthy
    DocumentTrue(String),
    /// Document has a value at a dotted path
    DocumentHas(String),
    /// A file exists in the job workspace
    FileExists(String),
    /// Every named operation is complete for this job
    After(Vec<String>),
    /// Negation
    Not(Box<Condition>),
}

impl Condition {
    /// Labelled predicate
    pub fn predicate<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Job) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Predicate {
            label: label.into(),
            predicate: Arc::new(f),
        }
    }

    /// Document value is truthy
    pub fn document_true(key: impl Into<String>) -> Self {
        Self::DocumentTrue(key.into())
    }

    /// Document has key
    pub fn document_has(key: impl Into<String>) -> Self {
        Self::DocumentHas(key.into())
    }

    /// Workspace file exists
    pub fn file_exists(name: impl Into<String>) -> Self {
        Self::FileExists(name.into())
    }

    /// All named operations complete
    pub fn after<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::After(operations.into_iter().map(Into::into).collect())
    }

    /// Negate a condition
    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Predicate { label, .. } => label.clone(),
            Self::Never => "never".to_string(),
            Self::DocumentTrue(key) => format!("doc.{key}"),
            Self::DocumentHas(key) => format!("has doc.{key}"),
            Self::FileExists(name) => format!("isfile {name}"),
            Self::After(ops) => format!("after {}", ops.join(", ")),
            Self::Not(inner) => format!("not ({})", inner.label()),
        }
    }

    /// Operations referenced through `After`, including under `Not`
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::After(ops) => ops.iter().map(String::as_str).collect(),
            Self::Not(inner) => inner.dependencies(),
            _ => Vec::new(),
        }
    }

    /// Evaluate against a job
    ///
    /// `is_complete` answers whether another operation is complete for the
    /// same job; it backs `After`.
    ///
    /// # Errors
    ///
    /// Returns whatever the predicate or `is_complete` raises
    pub fn evaluate(
        &self,
        job: &Job,
        is_complete: &mut dyn FnMut(&str) -> anyhow::Result<bool>,
    ) -> anyhow::Result<bool> {
        match self {
            Self::Predicate { predicate, .. } => predicate(job),
            Self::Never => Ok(false),
            Self::DocumentTrue(key) => Ok(job.document().get_path(key).is_some_and(is_truthy)),
            Self::DocumentHas(key) => Ok(job.document().get_path(key).is_some()),
            Self::FileExists(name) => Ok(job.is_file(name)),
            Self::After(ops) => {
                for op in ops {
                    if !is_complete(op)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Not(inner) => inner.evaluate(job, is_complete).map(|b| !b),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self.label())
    }
}
