//! Project file loading.
//!
//! A project file is JSON describing the workspace, command operations
//! with declarative conditions, groups and executor defaults. Operations
//! registered in code are merged with the ones declared in the file.

use indexmap::IndexMap;
use jobflow_plan::{Condition, Directives, Group, Operation, PlanError, Registry, RegistryBuilder};
use jobflow_runtime::ExecutorConfig;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default project file name
pub const PROJECT_FILE: &str = "jobflow.json";

/// Project loading errors
#[derive(Debug, Error)]
pub enum ProjectError {
    /// File could not be read
    #[error("Cannot read project file {}: {reason}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// File is not a valid project description
    #[error("Invalid project file {}: {reason}", path.display())]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// Declared operations and groups do not form a valid registry
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Declarative condition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSpec {
    /// Never holds
    Never,
    /// Document key is truthy
    DocumentTrue(String),
    /// Document key is present
    DocumentHas(String),
    /// File exists in the job workspace
    FileExists(String),
    /// Named operations are complete
    After(Vec<String>),
    /// Negation
    Not(Box<ConditionSpec>),
}

impl From<ConditionSpec> for Condition {
    fn from(declared: ConditionSpec) -> Self {
        match declared {
            ConditionSpec::Never => Condition::Never,
            ConditionSpec::DocumentTrue(key) => Condition::document_true(key),
            ConditionSpec::DocumentHas(key) => Condition::document_has(key),
            ConditionSpec::FileExists(name) => Condition::file_exists(name),
            ConditionSpec::After(ops) => Condition::after(ops),
            ConditionSpec::Not(inner) => Condition::not((*inner).into()),
        }
    }
}

/// Command operation declaration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationSpec {
    /// Operation name
    pub name: String,
    /// Command template
    pub command: String,
    /// Pre-conditions, all must hold
    #[serde(default)]
    pub pre: Vec<ConditionSpec>,
    /// Post-conditions, any marks the operation complete
    #[serde(default)]
    pub post: Vec<ConditionSpec>,
    /// Constant default directives
    #[serde(default)]
    pub directives: IndexMap<String, Value>,
    /// Run inside the job workspace
    #[serde(default)]
    pub with_job: bool,
}

impl OperationSpec {
    fn into_operation(self) -> Operation {
        let mut operation = Operation::command(self.name, self.command)
            .directives(Directives::from_constants(self.directives))
            .with_job(self.with_job);
        for condition in self.pre {
            operation = operation.pre(condition.into());
        }
        for condition in self.post {
            operation = operation.post(condition.into());
        }
        operation
    }
}

/// Group member, by name or with overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MemberSpec {
    /// Plain member
    Name(String),
    /// Member with directive overrides
    WithOverrides {
        /// Operation name
        name: String,
        /// Overrides applied on top of everything else
        directives: IndexMap<String, Value>,
    },
}

/// Group declaration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    /// Group name
    pub name: String,
    /// Members in order
    pub operations: Vec<MemberSpec>,
    /// Directives for every member
    #[serde(default)]
    pub directives: IndexMap<String, Value>,
    /// Extra flags for the invoking process
    #[serde(default)]
    pub run_options: Option<String>,
}

impl GroupSpec {
    fn into_group(self) -> Group {
        let mut group = Group::new(self.name).with_directives(Directives::from_constants(self.directives));
        if let Some(options) = self.run_options {
            group = group.with_run_options(options);
        }
        for member in self.operations {
            group = match member {
                MemberSpec::Name(name) => group.add_operation(name),
                MemberSpec::WithOverrides { name, directives } => {
                    group.add_operation_with(name, Directives::from_constants(directives))
                }
            };
        }
        group
    }
}

/// Executor defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSpec {
    /// Maximum parallel jobs
    pub max_parallel: Option<usize>,
    /// Per-invocation timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Shell for command operations
    pub shell: Option<String>,
}

/// Parsed project file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    /// Workspace directory, relative to the project file
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Executor defaults
    #[serde(default)]
    pub executor: ExecutorSpec,
    /// Command operations
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
    /// Groups
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

fn default_workspace() -> PathBuf {
    PathBuf::from("workspace")
}

impl Default for ProjectFile {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            executor: ExecutorSpec::default(),
            operations: Vec::new(),
            groups: Vec::new(),
        }
    }
}

/// A loaded project: where jobs live, what can run, and how
#[derive(Debug)]
pub struct Project {
    /// Directory holding the project file
    pub root: PathBuf,
    /// Job workspace
    pub workspace: PathBuf,
    /// Registered operations and groups
    pub registry: Registry,
    /// Executor defaults
    pub executor: ExecutorConfig,
}

impl Project {
    /// Load a project file and register its declarations on top of `builder`
    ///
    /// A missing file yields an empty project rooted next to `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if the
    /// combined registrations are invalid
    pub fn load(path: &Path, builder: RegistryBuilder) -> Result<Self, ProjectError> {
        let file = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|e| ProjectError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            serde_json::from_str(&text).map_err(|e| ProjectError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            debug!(path = %path.display(), "No project file, using defaults");
            ProjectFile::default()
        };

        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_file(file, root, builder)
    }

    /// Build a project from a parsed file
    ///
    /// # Errors
    ///
    /// Returns error if the combined registrations are invalid
    pub fn from_file(file: ProjectFile, root: PathBuf, mut builder: RegistryBuilder) -> Result<Self, ProjectError> {
        for declared in file.operations {
            builder.register_operation(declared.into_operation())?;
        }
        for declared in file.groups {
            builder.register_group(declared.into_group())?;
        }
        let registry = builder.build()?;

        let mut executor = ExecutorConfig::default()
            .with_project_root(root.clone())
            .with_timeout(file.executor.timeout_secs.map(Duration::from_secs));
        if let Some(max) = file.executor.max_parallel {
            executor = executor.with_max_parallel(max);
        }
        if let Some(shell) = file.executor.shell {
            executor = executor.with_shell(shell);
        }

        let workspace = root.join(file.workspace);
        info!(
            workspace = %workspace.display(),
            operations = registry.operation_count(),
            groups = registry.group_count(),
            "Project loaded"
        );
        Ok(Self {
            root,
            workspace,
            registry,
            executor,
        })
    }
}
