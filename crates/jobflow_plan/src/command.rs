//! Command materialization.
//!
//! Command templates reference the job through brace placeholders:
//!
//! | placeholder | value |
//! |---|---|
//! | `{job.id}` | full job id |
//! | `{job.ws}`, `{job.path}` | job workspace directory |
//! | `{sp.KEY}`, `{job.sp.KEY}` | state point value at a dotted path |
//! | `{doc.KEY}`, `{job.doc.KEY}` | document value at a dotted path |
//!
//! `{{` and `}}` produce literal braces. Strings are substituted as-is,
//! other values as compact JSON.

use crate::directive::ResolvedDirectives;
use crate::error::MaterializeError;
use crate::operation::{Operation, OperationBody, OperationFn};
use jobflow_core::{Job, JobId};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("Valid regex"));

/// What to execute for one (job, operation) pair
#[derive(Clone)]
pub enum Invocation {
    /// Call the operation body in-process with the job
    Call {
        /// Target job
        job: JobId,
        /// Operation name
        operation: String,
        /// Body to call
        body: OperationFn,
    },
    /// Run a shell command
    Shell {
        /// Target job
        job: JobId,
        /// Operation name
        operation: String,
        /// Fully rendered command line
        command: String,
        /// Working directory, when the operation runs inside the job workspace
        working_dir: Option<PathBuf>,
    },
}

impl Invocation {
    /// Target job
    #[must_use]
    pub fn job(&self) -> JobId {
        match self {
            Self::Call { job, .. } | Self::Shell { job, .. } => *job,
        }
    }

    /// Operation name
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::Call { operation, .. } | Self::Shell { operation, .. } => operation,
        }
    }

    /// Rendered command line, for shell invocations
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Call { .. } => None,
            Self::Shell { command, .. } => Some(command),
        }
    }

    /// Short human-readable description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Call { job, operation, .. } => format!("{operation}({})", job.short()),
            Self::Shell { command, .. } => command.clone(),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { job, operation, .. } => f
                .debug_struct("Call")
                .field("job", job)
                .field("operation", operation)
                .finish_non_exhaustive(),
            Self::Shell {
                job,
                operation,
                command,
                working_dir,
            } => f
                .debug_struct("Shell")
                .field("job", job)
                .field("operation", operation)
                .field("command", command)
                .field("working_dir", working_dir)
                .finish(),
        }
    }
}

/// Turns an operation plus resolved directives into an [`Invocation`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandGenerator;

impl CommandGenerator {
    /// Create a generator
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Materialize the invocation for one job
    ///
    /// Function operations become [`Invocation::Call`] untouched. Command
    /// operations have their template rendered and, when an `executable`
    /// directive is present, prefixed with it.
    ///
    /// # Errors
    ///
    /// Returns error if a placeholder names a missing key or an unknown
    /// namespace. No partial command is produced.
    pub fn materialize(
        &self,
        operation: &Operation,
        directives: &ResolvedDirectives,
        job: &Job,
    ) -> Result<Invocation, MaterializeError> {
        match operation.body() {
            OperationBody::Function(body) => Ok(Invocation::Call {
                job: job.id(),
                operation: operation.name().to_string(),
                body: body.clone(),
            }),
            OperationBody::Command(template) => {
                let mut command = self.render(template, operation.name(), job)?;
                if let Some(exe) = directives.executable() {
                    command = format!("{exe} {command}");
                }
                if let Some(options) = directives.run_options() {
                    command.push(' ');
                    command.push_str(options);
                }
                Ok(Invocation::Shell {
                    job: job.id(),
                    operation: operation.name().to_string(),
                    command,
                    working_dir: operation
                        .runs_with_job()
                        .then(|| job.workspace().to_path_buf()),
                })
            }
        }
    }

    /// Command line that re-enters a function operation through a CLI
    ///
    /// Renders `[executable] <program> exec <operation> <job-id>` followed
    /// by any run options.
    #[must_use]
    pub fn exec_line(
        &self,
        program: &str,
        operation: &str,
        directives: &ResolvedDirectives,
        job: JobId,
    ) -> String {
        let mut line = match directives.executable() {
            Some(exe) => format!("{exe} {program} exec {operation} {job}"),
            None => format!("{program} exec {operation} {job}"),
        };
        if let Some(options) = directives.run_options() {
            line.push(' ');
            line.push_str(options);
        }
        line
    }

    /// Substitute placeholders in a template
    ///
    /// # Errors
    ///
    /// Returns the first placeholder that cannot be resolved
    pub fn render(
        &self,
        template: &str,
        operation: &str,
        job: &Job,
    ) -> Result<String, MaterializeError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&template[last..whole.start()]);
            out.push_str(&substitute(&caps, operation, job)?);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

fn substitute(caps: &Captures<'_>, operation: &str, job: &Job) -> Result<String, MaterializeError> {
    let Some(inner) = caps.get(1) else {
        // `{{` or `}}`
        return Ok(caps[0][..1].to_string());
    };
    let placeholder = inner.as_str().trim();

    match placeholder {
        "job.id" => return Ok(job.id().to_hex()),
        "job.ws" | "job.path" => return Ok(job.workspace().display().to_string()),
        _ => {}
    }

    let lookup = |params: &jobflow_core::ParameterSet, key: &str| {
        params
            .get_path(key)
            .map(format_value)
            .ok_or_else(|| MaterializeError::MissingPlaceholder {
                job: job.id(),
                operation: operation.to_string(),
                key: key.to_string(),
            })
    };

    let path = placeholder.strip_prefix("job.").unwrap_or(placeholder);
    if let Some(key) = path.strip_prefix("sp.").filter(|k| !k.is_empty()) {
        lookup(job.statepoint(), key)
    } else if let Some(key) = path.strip_prefix("doc.").filter(|k| !k.is_empty()) {
        lookup(job.document(), key)
    } else {
        Err(MaterializeError::InvalidPlaceholder {
            job: job.id(),
            operation: operation.to_string(),
            placeholder: placeholder.to_string(),
        })
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
