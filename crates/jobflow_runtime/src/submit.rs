//! Submission bundles and script templating.
//!
//! A [`Submission`] is the stable, named structure handed to a template:
//! one entry per scheduled unit with its resolved directives and final
//! command line. Function operations are expressed as a command that
//! re-enters the CLI through its `exec` action.

use crate::scheduler::ScheduledUnit;
use chrono::{DateTime, Utc};
use jobflow_core::{Hash, JobId};
use jobflow_plan::{CommandGenerator, Invocation, ResolvedDirectives};
use serde::Serialize;
use serde_json::Value;

/// One unit in a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEntry {
    /// Job id
    pub job: JobId,
    /// Operation name
    pub operation: String,
    /// Group the operation runs under
    pub group: Option<String>,
    /// Resolved directives
    pub directives: ResolvedDirectives,
    /// Command line to run
    pub command: String,
}

/// An ordered bundle of units to submit together
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    id: Hash,
    parallel: bool,
    created: DateTime<Utc>,
    entries: Vec<SubmissionEntry>,
}

impl Submission {
    /// Bundle scheduled units
    ///
    /// `program` is the CLI used to re-enter function operations.
    #[must_use]
    pub fn bundle(units: &[ScheduledUnit], program: &str, parallel: bool) -> Self {
        let generator = CommandGenerator::new();
        let entries: Vec<SubmissionEntry> = units
            .iter()
            .map(|unit| SubmissionEntry {
                job: unit.job,
                operation: unit.operation.clone(),
                group: unit.group.clone(),
                directives: unit.directives.clone(),
                command: match &unit.invocation {
                    Invocation::Shell {
                        command,
                        working_dir: Some(dir),
                        ..
                    } => format!("(cd \"{}\" && {command})", dir.display()),
                    Invocation::Shell { command, .. } => command.clone(),
                    Invocation::Call { .. } => {
                        generator.exec_line(program, &unit.operation, &unit.directives, unit.job)
                    }
                },
            })
            .collect();

        Self {
            id: bundle_id(&entries, parallel),
            parallel,
            created: Utc::now(),
            entries,
        }
    }

    /// Bundle id: a digest over the mode and the ordered entries
    #[must_use]
    pub fn id(&self) -> Hash {
        self.id
    }

    /// Entries in execution order
    #[must_use]
    pub fn entries(&self) -> &[SubmissionEntry] {
        &self.entries
    }

    /// Whether entries run concurrently
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Creation time
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Total resource count: sum of `np` when parallel, max when serial
    #[must_use]
    pub fn np(&self) -> u64 {
        let counts = self.entries.iter().map(|e| e.directives.np());
        if self.parallel {
            counts.sum()
        } else {
            counts.max().unwrap_or(0)
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the bundle is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn bundle_id(entries: &[SubmissionEntry], parallel: bool) -> Hash {
    let mut parts = vec![if parallel { "parallel" } else { "serial" }.to_string()];
    for entry in entries {
        parts.push(entry.job.to_hex());
        parts.push(entry.operation.clone());
        parts.push(entry.group.clone().unwrap_or_default());
        parts.push(
            entry
                .directives
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        parts.push(entry.command.clone());
    }
    Hash::compute_parts(parts.iter().map(String::as_bytes))
}

/// Renders a submission into script text
pub trait ScriptTemplate {
    /// Render the script
    fn render(&self, submission: &Submission) -> String;
}

/// Plain shell script with directives as comments
#[derive(Debug, Clone)]
pub struct ShellScriptTemplate {
    interpreter: String,
    prelude: Vec<String>,
}

impl Default for ShellScriptTemplate {
    fn default() -> Self {
        Self {
            interpreter: "/bin/bash".to_string(),
            prelude: vec!["set -u".to_string()],
        }
    }
}

impl ShellScriptTemplate {
    /// Create the default template
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interpreter in the shebang line
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Append a line emitted before the first command
    #[must_use]
    pub fn with_prelude(mut self, line: impl Into<String>) -> Self {
        self.prelude.push(line.into());
        self
    }
}

impl ScriptTemplate for ShellScriptTemplate {
    fn render(&self, submission: &Submission) -> String {
        let total = submission.len();
        let mut lines = vec![
            format!("#!{}", self.interpreter),
            format!("# bundle: {}", submission.id()),
            format!("# created: {}", submission.created().to_rfc3339()),
            format!("# units: {total}"),
            format!("# np: {}", submission.np()),
            format!(
                "# mode: {}",
                if submission.is_parallel() { "parallel" } else { "serial" }
            ),
        ];
        lines.extend(self.prelude.iter().cloned());

        for (i, entry) in submission.entries().iter().enumerate() {
            lines.push(String::new());
            let group = entry
                .group
                .as_deref()
                .map(|g| format!(" [{g}]"))
                .unwrap_or_default();
            lines.push(format!(
                "# ({}/{total}) {} {}{group}",
                i + 1,
                entry.operation,
                entry.job
            ));
            for (name, value) in entry.directives.iter() {
                lines.push(format!("# {name}: {}", directive_text(value)));
            }
            if submission.is_parallel() {
                lines.push(format!("{} &", entry.command));
            } else {
                lines.push(entry.command.clone());
            }
        }

        if submission.is_parallel() && total > 0 {
            lines.push(String::new());
            lines.push("wait".to_string());
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

fn directive_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
