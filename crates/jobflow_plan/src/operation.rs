//! Operation definitions.

use crate::condition::Condition;
use crate::directive::Directives;
use jobflow_core::Job;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Direct-call operation body; may mutate the job document
pub type OperationFn = Arc<dyn Fn(&mut Job) -> anyhow::Result<()> + Send + Sync>;

/// Executable body of an operation
#[derive(Clone)]
pub enum OperationBody {
    /// Called in-process with the job
    Function(OperationFn),
    /// Shell command template with job placeholders
    Command(String),
}

/// Declared kind of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Direct-call
    Function,
    /// Shell command
    Command,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// A named unit of work with conditions and default directives
#[derive(Clone)]
pub struct Operation {
    name: String,
    body: OperationBody,
    pre: Vec<Condition>,
    post: Vec<Condition>,
    directives: Directives,
    with_job: bool,
}

impl Operation {
    /// Direct-call operation
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Job) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_body(name, OperationBody::Function(Arc::new(f)))
    }

    /// Command operation from a template
    pub fn command(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::with_body(name, OperationBody::Command(template.into()))
    }

    fn with_body(name: impl Into<String>, body: OperationBody) -> Self {
        Self {
            name: name.into(),
            body,
            pre: Vec::new(),
            post: Vec::new(),
            directives: Directives::new(),
            with_job: false,
        }
    }

    /// Append a pre-condition
    #[must_use]
    pub fn pre(mut self, condition: Condition) -> Self {
        self.pre.push(condition);
        self
    }

    /// Append a post-condition
    #[must_use]
    pub fn post(mut self, condition: Condition) -> Self {
        self.post.push(condition);
        self
    }

    /// Set a constant default directive
    #[must_use]
    pub fn directive(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.directives = self.directives.with(name, value);
        self
    }

    /// Overlay a set of default directives
    #[must_use]
    pub fn directives(mut self, directives: Directives) -> Self {
        self.directives.merge(&directives);
        self
    }

    /// Run command operations inside the job workspace
    #[must_use]
    pub fn with_job(mut self, with_job: bool) -> Self {
        self.with_job = with_job;
        self
    }

    /// Operation name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executable body
    #[must_use]
    pub fn body(&self) -> &OperationBody {
        &self.body
    }

    /// Declared kind
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self.body {
            OperationBody::Function(_) => OperationKind::Function,
            OperationBody::Command(_) => OperationKind::Command,
        }
    }

    /// Pre-conditions in registration order
    #[must_use]
    pub fn pre_conditions(&self) -> &[Condition] {
        &self.pre
    }

    /// Post-conditions in registration order
    #[must_use]
    pub fn post_conditions(&self) -> &[Condition] {
        &self.post
    }

    /// Default directives
    #[must_use]
    pub fn default_directives(&self) -> &Directives {
        &self.directives
    }

    /// Whether commands run inside the job workspace
    #[must_use]
    pub fn runs_with_job(&self) -> bool {
        self.with_job
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("pre", &self.pre)
            .field("post", &self.post)
            .field("directives", &self.directives)
            .field("with_job", &self.with_job)
            .finish()
    }
}
