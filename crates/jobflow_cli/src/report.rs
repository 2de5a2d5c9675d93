//! Console rendering for status tables and run summaries.

use console::style;
use jobflow_runtime::{Eligibility, Evaluation, RunSummary, UnitReport, UnitState};

fn state_cell(evaluation: &Evaluation) -> String {
    match &evaluation.outcome {
        Ok(eligibility @ (Eligibility::Eligible | Eligibility::Forced)) => {
            style(eligibility.to_string()).green().to_string()
        }
        Ok(eligibility @ Eligibility::Blocked { .. }) => style(eligibility.to_string()).yellow().to_string(),
        Ok(eligibility @ Eligibility::Ineligible { .. }) => style(eligibility.to_string()).dim().to_string(),
        Err(_) => style(UnitState::Failed.to_string()).red().bold().to_string(),
    }
}

/// Render evaluations as an aligned table, errors under their row
#[must_use]
pub fn status_table(evaluations: &[Evaluation]) -> String {
    let op_width = evaluations
        .iter()
        .map(|e| e.operation.len())
        .chain(["OPERATION".len()])
        .max()
        .unwrap_or_default();
    let group_width = evaluations
        .iter()
        .map(|e| e.group.as_deref().map_or(1, str::len))
        .chain(["GROUP".len()])
        .max()
        .unwrap_or_default();

    let mut lines = vec![
        style(format!(
            "{:<8}  {:<op_width$}  {:<group_width$}  STATE",
            "JOB", "OPERATION", "GROUP"
        ))
        .bold()
        .to_string(),
    ];
    for evaluation in evaluations {
        lines.push(format!(
            "{:<8}  {:<op_width$}  {:<group_width$}  {}",
            evaluation.job.short(),
            evaluation.operation,
            evaluation.group.as_deref().unwrap_or("-"),
            state_cell(evaluation)
        ));
        if let Err(err) = &evaluation.outcome {
            lines.push(format!("          {}", style(err).red()));
        }
    }
    lines.join("\n")
}

fn failure_line(report: &UnitReport) -> String {
    let reason = report
        .error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!(
        "  {} {} {}: {reason}",
        style("✗").red(),
        report.operation,
        report.job.short()
    )
}

/// Render a run summary with one line per failure
#[must_use]
pub fn run_summary(summary: &RunSummary) -> String {
    let headline = if summary.is_success() {
        format!("{} {summary}", style("✓").green().bold())
    } else {
        format!("{} {summary}", style("✗").red().bold())
    };
    let mut lines = vec![headline];
    lines.extend(summary.failures().map(failure_line));
    lines.join("\n")
}
