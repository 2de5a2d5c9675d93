//! Jobflow CLI
//!
//! Command-line front end over a project file: create jobs, inspect their
//! status, run eligible operations, bundle them into submission scripts,
//! and execute a single function operation for one job.
//!
//! Embedders register function operations in code and hand the builder to
//! [`main_with`]; declarations from the project file are added on top.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod project;
pub mod report;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use indicatif::{ProgressBar, ProgressStyle};
use jobflow_core::{JobId, ParameterSet};
use jobflow_plan::{RegistryBuilder, Scope};
use jobflow_runtime::{
    EligibilityScheduler, Executor, ExecutorConfig, ForceSet, RunConfig, RunEngine, ScriptTemplate, ShellScriptTemplate,
    Submission, UnitOutcome,
};
use jobflow_store::{DirectoryStore, JobFilter, JobStore};
use project::{PROJECT_FILE, Project};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "JOBFLOW_LOG";

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "jobflow")]
#[command(about = "Run operations over parameterized jobs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project file
    #[arg(short, long, global = true, default_value = PROJECT_FILE)]
    pub project: PathBuf,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Action
    #[command(subcommand)]
    pub command: Command,
}

/// Actions
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create jobs from a JSON array of parameter sets
    Init {
        /// File holding the array, `-` for stdin
        file: PathBuf,
    },

    /// Show eligibility of every selected (job, operation) pair
    Status {
        #[command(flatten)]
        selection: Selection,
    },

    /// Execute eligible operations
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Maximum jobs executing at once
        #[arg(long)]
        parallel: Option<usize>,

        /// Per-invocation timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Scheduling passes, 0 runs until nothing new is eligible
        #[arg(long, default_value_t = 1)]
        num_passes: usize,
    },

    /// Write a submission script for eligible operations
    Submit {
        #[command(flatten)]
        selection: Selection,

        /// Run bundle entries concurrently
        #[arg(long)]
        parallel_bundle: bool,

        /// Script destination, stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Execute one operation for one job, ignoring conditions
    Exec {
        /// Operation name
        operation: String,
        /// Job id or unique prefix
        job: String,
        /// Run options forwarded by a submission script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },
}

/// Which pairs an action covers
#[derive(Debug, Clone, Default, Args)]
pub struct Selection {
    /// Operation to consider (repeatable)
    #[arg(short = 'o', long = "operation")]
    pub operations: Vec<String>,

    /// Group to consider (repeatable)
    #[arg(short = 'g', long = "group", conflicts_with = "operations")]
    pub groups: Vec<String>,

    /// Job id or unique prefix (repeatable), all jobs if omitted
    #[arg(short = 'j', long = "job")]
    pub jobs: Vec<String>,

    /// Bypass conditions
    #[arg(long)]
    pub force: bool,
}

impl Selection {
    /// Request scope
    #[must_use]
    pub fn scope(&self) -> Scope {
        if !self.groups.is_empty() {
            Scope::groups(self.groups.iter().cloned())
        } else if !self.operations.is_empty() {
            Scope::operations(self.operations.iter().cloned())
        } else {
            Scope::All
        }
    }

    /// Resolve job selectors against a store
    ///
    /// # Errors
    ///
    /// Returns error if a selector matches no job or several
    pub fn resolve_jobs(&self, store: &dyn JobStore) -> Result<Vec<JobId>> {
        if self.jobs.is_empty() {
            return Ok(store.iterate_jobs(&JobFilter::all())?);
        }
        self.jobs
            .iter()
            .map(|prefix| store.resolve_prefix(prefix).map_err(Into::into))
            .collect()
    }
}

/// Install the tracing subscriber
///
/// The filter comes from `JOBFLOW_LOG`; without it the crate log level is
/// info, raised by each `-v`.
pub fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "jobflow=info",
        1 => "jobflow=debug",
        _ => "jobflow=trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Parse arguments and run with operations registered in `builder`
///
/// # Errors
///
/// Returns error on invalid project, store failure, or I/O failure
pub fn main_with(builder: RegistryBuilder) -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    run(cli, builder)
}

/// Run parsed arguments
///
/// # Errors
///
/// Returns error on invalid project, store failure, or I/O failure
pub fn run(cli: Cli, builder: RegistryBuilder) -> Result<ExitCode> {
    let succeeded = execute(&cli, builder)?;
    Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Run parsed arguments, returning whether every unit succeeded
///
/// # Errors
///
/// Returns error on invalid project, store failure, or I/O failure
pub fn execute(cli: &Cli, builder: RegistryBuilder) -> Result<bool> {
    let project = Project::load(&cli.project, builder)?;
    let store: Arc<dyn JobStore> = Arc::new(DirectoryStore::open(&project.workspace)?);

    match &cli.command {
        Command::Init { file } => init(store.as_ref(), file),
        Command::Status { selection } => status(project, store, selection),
        Command::Run {
            selection,
            parallel,
            timeout,
            num_passes,
        } => {
            let mut executor = project.executor.clone();
            if let Some(max) = parallel {
                executor = executor.with_max_parallel(*max);
            }
            if let Some(secs) = timeout {
                executor = executor.with_timeout(Some(Duration::from_secs(*secs)));
            }
            let config = RunConfig::default()
                .with_num_passes(*num_passes)
                .with_force(selection.force);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_jobs(project, store, executor, selection, &config))
        }
        Command::Submit {
            selection,
            parallel_bundle,
            output,
        } => submit(cli, project, store, selection, *parallel_bundle, output.as_deref()),
        Command::Exec {
            operation,
            job,
            options,
        } => {
            if !options.is_empty() {
                info!(operation = %operation, options = %options.join(" "), "Run options received");
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(exec(project, store, operation, job))
        }
    }
}

fn init(store: &dyn JobStore, file: &Path) -> Result<bool> {
    let text = if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(file)?
    };

    let Value::Array(items) = serde_json::from_str::<Value>(&text)? else {
        return Err(eyre!("Expected a JSON array of parameter sets"));
    };
    for item in items {
        let id = store.open_job(ParameterSet::from_value(item)?)?;
        println!("{id}");
    }
    Ok(true)
}

fn status(project: Project, store: Arc<dyn JobStore>, selection: &Selection) -> Result<bool> {
    let jobs = selection.resolve_jobs(store.as_ref())?;
    let scheduler = EligibilityScheduler::new(Arc::new(project.registry), store);
    let evaluations = scheduler.evaluate(&jobs, &selection.scope(), &ForceSet::from_flag(selection.force))?;

    println!("{}", report::status_table(&evaluations));
    Ok(evaluations.iter().all(|e| e.outcome.is_ok()))
}

async fn run_jobs(
    project: Project,
    store: Arc<dyn JobStore>,
    executor: ExecutorConfig,
    selection: &Selection,
    config: &RunConfig,
) -> Result<bool> {
    let jobs = selection.resolve_jobs(store.as_ref())?;
    let engine = RunEngine::new(Arc::new(project.registry), store, executor);

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {pos} units {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    let on_outcome = |outcome: &UnitOutcome| {
        bar.set_message(format!("{} {} {}", outcome.operation, outcome.job.short(), outcome.state));
        bar.inc(1);
    };

    let summary = engine.run_with(&jobs, &selection.scope(), config, &on_outcome).await;
    bar.finish_and_clear();
    let summary = summary?;

    println!("{}", report::run_summary(&summary));
    Ok(summary.is_success())
}

fn submit(
    cli: &Cli,
    project: Project,
    store: Arc<dyn JobStore>,
    selection: &Selection,
    parallel: bool,
    output: Option<&Path>,
) -> Result<bool> {
    let jobs = selection.resolve_jobs(store.as_ref())?;
    let scheduler = EligibilityScheduler::new(Arc::new(project.registry), store);
    let schedule = scheduler.schedule(&jobs, &selection.scope(), &ForceSet::from_flag(selection.force))?;

    for failure in &schedule.failures {
        warn!(job = %failure.job(), operation = failure.operation(), "{failure}");
    }
    if schedule.units.is_empty() {
        eprintln!("Nothing to submit");
        return Ok(schedule.failures.is_empty());
    }

    let program = format!("{} --project {}", program_name(), cli.project.display());
    let submission = Submission::bundle(&schedule.units, &program, parallel);
    let script = ShellScriptTemplate::new().render(&submission);
    match output {
        Some(path) => {
            std::fs::write(path, script)?;
            info!(bundle = %submission.id(), units = submission.len(), path = %path.display(), "Submission written");
        }
        None => print!("{script}"),
    }
    Ok(schedule.failures.is_empty())
}

fn program_name() -> String {
    std::env::args().next().unwrap_or_else(|| "jobflow".to_string())
}

async fn exec(project: Project, store: Arc<dyn JobStore>, operation: &str, job: &str) -> Result<bool> {
    let id = store.resolve_prefix(job)?;
    let scheduler = EligibilityScheduler::new(Arc::new(project.registry), Arc::clone(&store));
    let mut schedule = scheduler.schedule(&[id], &Scope::operations([operation]), &ForceSet::All)?;

    if let Some(failure) = schedule.failures.pop() {
        eprintln!("{}", console::style(&failure).red());
        return Ok(false);
    }
    let Some(unit) = schedule.units.pop() else {
        return Err(eyre!("Operation {operation:?} was not scheduled for job {id}"));
    };

    let outcome = Executor::new(store, project.executor).execute_unit(unit).await?;
    match &outcome.error {
        Some(err) => eprintln!("{}", console::style(err).red()),
        None => eprintln!(
            "{} {} {} in {:.2?}",
            console::style("✓").green(),
            outcome.operation,
            outcome.job.short(),
            outcome.duration()
        ),
    }
    Ok(outcome.succeeded())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_plan::{Condition, Operation, Registry};
    use serde_json::json;

    const PROJECT: &str = r#"{
        "operations": [
            {
                "name": "simulate",
                "command": "echo {sp.T} > out.txt",
                "post": [{"file_exists": "out.txt"}],
                "with_job": true
            }
        ],
        "groups": [
            {"name": "cluster", "operations": ["simulate", "summarize"], "directives": {"np": 2}}
        ]
    }"#;

    fn project_dir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join(PROJECT_FILE);
        std::fs::write(&project, PROJECT).unwrap();
        std::fs::write(dir.path().join("jobs.json"), r#"[{"T": 1}, {"T": 2}]"#).unwrap();
        (dir, project)
    }

    fn builder() -> RegistryBuilder {
        Registry::builder()
            .operation(
                Operation::function("summarize", |job| {
                    job.document_mut().insert("summarized", json!(true));
                    Ok(())
                })
                .pre(Condition::after(["simulate"]))
                .post(Condition::document_true("summarized")),
            )
            .unwrap()
    }

    fn cli(project: &Path, args: &[&str]) -> Cli {
        let project = project.to_string_lossy().to_string();
        let mut argv = vec!["jobflow", "--project", project.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn init_jobs(dir: &Path, project: &Path) -> Vec<JobId> {
        let jobs = dir.join("jobs.json").to_string_lossy().to_string();
        assert!(execute(&cli(project, &["init", jobs.as_str()]), builder()).unwrap());
        let store = DirectoryStore::open(dir.join("workspace")).unwrap();
        store.iterate_jobs(&JobFilter::all()).unwrap()
    }

    #[test]
    fn test_parse_selection_flags() {
        let cli = Cli::try_parse_from([
            "jobflow", "run", "-o", "simulate", "-o", "summarize", "-j", "ab12", "--force", "--parallel", "4",
            "--timeout", "60", "--num-passes", "0", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.project, PathBuf::from(PROJECT_FILE));
        let Command::Run {
            selection,
            parallel,
            timeout,
            num_passes,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(selection.scope(), Scope::operations(["simulate", "summarize"]));
        assert_eq!(selection.jobs, vec!["ab12"]);
        assert!(selection.force);
        assert_eq!(parallel, Some(4));
        assert_eq!(timeout, Some(60));
        assert_eq!(num_passes, 0);
    }

    #[test]
    fn test_operation_and_group_conflict() {
        assert!(Cli::try_parse_from(["jobflow", "status", "-o", "a", "-g", "b"]).is_err());
        let cli = Cli::try_parse_from(["jobflow", "submit", "-g", "cluster", "--parallel-bundle"]).unwrap();
        let Command::Submit {
            selection,
            parallel_bundle,
            output,
        } = cli.command
        else {
            panic!("expected submit");
        };
        assert_eq!(selection.scope(), Scope::groups(["cluster"]));
        assert!(parallel_bundle);
        assert!(output.is_none());
    }

    #[test]
    fn test_init_creates_jobs_idempotently() {
        let (dir, project) = project_dir();
        let first = init_jobs(dir.path(), &project);
        let second = init_jobs(dir.path(), &project);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_init_rejects_non_array() {
        let (dir, project) = project_dir();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, r#"{"T": 1}"#).unwrap();
        let file = file.to_string_lossy().to_string();
        assert!(execute(&cli(&project, &["init", file.as_str()]), builder()).is_err());
    }

    #[test]
    fn test_run_until_complete_and_status() {
        let (dir, project) = project_dir();
        let jobs = init_jobs(dir.path(), &project);

        assert!(execute(&cli(&project, &["status"]), builder()).unwrap());
        assert!(execute(&cli(&project, &["run", "--num-passes", "0"]), builder()).unwrap());

        let store = DirectoryStore::open(dir.path().join("workspace")).unwrap();
        for id in &jobs {
            let job = store.get(id).unwrap();
            assert!(job.is_file("out.txt"));
            assert_eq!(job.document().get("summarized"), Some(&json!(true)));
        }
    }

    #[test]
    fn test_submit_writes_script() {
        let (dir, project) = project_dir();
        init_jobs(dir.path(), &project);
        let script = dir.path().join("submit.sh");
        let output = script.to_string_lossy().to_string();

        let args = ["submit", "-g", "cluster", "--parallel-bundle", "--output", output.as_str()];
        assert!(execute(&cli(&project, &args), builder()).unwrap());

        let text = std::fs::read_to_string(&script).unwrap();
        assert!(text.starts_with("#!/bin/bash"));
        assert!(text.contains("# np: 4"));
        assert_eq!(text.matches("echo ").count(), 2);
        assert!(!text.contains("exec summarize"));
        assert!(text.trim_end().ends_with("wait"));
    }

    #[test]
    fn test_submitted_exec_line_parses() {
        let (dir, project) = project_dir();
        std::fs::write(
            &project,
            r#"{
                "operations": [{"name": "simulate", "command": "true"}],
                "groups": [{
                    "name": "cluster",
                    "operations": ["summarize"],
                    "directives": {"executable": "env JOBFLOW_LOG=debug"},
                    "run_options": "--debug --verbose"
                }]
            }"#,
        )
        .unwrap();
        let jobs = init_jobs(dir.path(), &project);
        let script = dir.path().join("submit.sh");
        let output = script.to_string_lossy().to_string();

        let target = jobs[0].to_hex();
        let args = ["submit", "-g", "cluster", "--force", "-j", target.as_str(), "--output", output.as_str()];
        assert!(execute(&cli(&project, &args), builder()).unwrap());

        let text = std::fs::read_to_string(&script).unwrap();
        let line = text
            .lines()
            .find(|l| l.contains(" exec summarize "))
            .unwrap();
        let argv = line.strip_prefix("env JOBFLOW_LOG=debug ").unwrap();
        let parsed = Cli::try_parse_from(argv.split_whitespace()).unwrap();

        assert_eq!(parsed.project, project);
        let Command::Exec {
            operation,
            job,
            options,
        } = parsed.command
        else {
            panic!("expected exec");
        };
        assert_eq!(operation, "summarize");
        assert_eq!(job, target);
        assert_eq!(options, vec!["--debug", "--verbose"]);
    }

    #[test]
    fn test_exec_runs_function_operation() {
        let (dir, project) = project_dir();
        let jobs = init_jobs(dir.path(), &project);
        let prefix = jobs[0].short();

        assert!(execute(&cli(&project, &["exec", "summarize", prefix.as_str()]), builder()).unwrap());
        let store = DirectoryStore::open(dir.path().join("workspace")).unwrap();
        assert_eq!(store.get(&jobs[0]).unwrap().document().get("summarized"), Some(&json!(true)));
        assert!(store.get(&jobs[1]).unwrap().document().get("summarized").is_none());

        let missing = execute(&cli(&project, &["exec", "ghost", prefix.as_str()]), builder());
        assert!(missing.is_err());
    }
}
