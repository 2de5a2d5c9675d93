//! Directive resolution.

use crate::directive::{DirectiveValue, Directives, ResolvedDirectives};
use crate::error::DirectiveError;
use crate::group::Group;
use crate::operation::Operation;
use jobflow_core::Job;
use serde_json::Value;
use tracing::debug;

/// Merges operation defaults with group directives and evaluates them for a job
///
/// Precedence, lowest first:
/// 1. the operation's default directives
/// 2. each group's defaults, in the order given
/// 3. each group's override for this operation, in the same order
///
/// Job-dependent values are evaluated once, after merging, against the
/// job passed in. Nothing is cached across jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveResolver;

impl DirectiveResolver {
    /// Create a resolver
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Merge without evaluating
    #[must_use]
    pub fn merge(&self, operation: &Operation, groups: &[&Group]) -> Directives {
        let mut merged = operation.default_directives().clone();
        for group in groups {
            merged.merge(group.directives());
        }
        for group in groups {
            if let Some(overrides) = group.override_for(operation.name()) {
                merged.merge(overrides);
            }
        }
        merged
    }

    /// Merge and evaluate for one job
    ///
    /// # Errors
    ///
    /// Returns error if a job-dependent directive fails
    pub fn resolve(
        &self,
        operation: &Operation,
        groups: &[&Group],
        job: &Job,
    ) -> Result<ResolvedDirectives, DirectiveError> {
        let merged = self.merge(operation, groups);
        let mut resolved = ResolvedDirectives::new();
        for (name, value) in merged.iter() {
            let value = match value {
                DirectiveValue::Constant(v) => v.clone(),
                DirectiveValue::Options(s) => Value::String(s.clone()),
                DirectiveValue::Computed(f) => f(job).map_err(|e| DirectiveError {
                    job: job.id(),
                    operation: operation.name().to_string(),
                    directive: name.clone(),
                    reason: format!("{e:#}"),
                })?,
            };
            resolved.insert(name.clone(), value);
        }
        debug!(
            job = %job.id(),
            operation = operation.name(),
            directives = resolved.len(),
            "Directives resolved"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{NP, RUN_OPTIONS};
    use jobflow_core::ParameterSet;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_job(sp: Value) -> Job {
        Job::new(
            ParameterSet::from_value(sp).unwrap(),
            ParameterSet::new(),
            PathBuf::from("/ws"),
        )
    }

    #[test]
    fn test_merge_precedence() {
        let op = Operation::command("simulate", "run").directive(NP, 1);
        let group = Group::new("cluster")
            .with_directive(NP, 2)
            .add_operation_with("simulate", Directives::new().with(NP, 4));

        let resolved = DirectiveResolver::new()
            .resolve(&op, &[&group], &make_job(json!({"T": 1})))
            .unwrap();
        assert_eq!(resolved.get(NP), Some(&json!(4)));
    }

    #[test]
    fn test_group_default_beats_operation_default() {
        let op = Operation::command("simulate", "run").directive(NP, 1);
        let group = Group::new("cluster").with_directive(NP, 2).add_operation("simulate");
        let resolved = DirectiveResolver::new()
            .resolve(&op, &[&group], &make_job(json!({})))
            .unwrap();
        assert_eq!(resolved.np(), 2);
    }

    #[test]
    fn test_overrides_apply_after_all_group_defaults() {
        // Second group's default does not beat the first group's override
        let op = Operation::command("simulate", "run");
        let first = Group::new("a").add_operation_with("simulate", Directives::new().with(NP, 8));
        let second = Group::new("b").with_directive(NP, 3).add_operation("simulate");
        let resolved = DirectiveResolver::new()
            .resolve(&op, &[&first, &second], &make_job(json!({})))
            .unwrap();
        assert_eq!(resolved.np(), 8);
    }

    #[test]
    fn test_run_options_concatenate_in_group_order() {
        let op = Operation::command("simulate", "run");
        let debug = Group::new("debug").with_run_options("--debug").add_operation("simulate");
        let verbose = Group::new("verbose").with_run_options("--verbose").add_operation("simulate");

        let resolved = DirectiveResolver::new()
            .resolve(&op, &[&debug, &verbose], &make_job(json!({})))
            .unwrap();
        assert_eq!(resolved.get_str(RUN_OPTIONS), Some("--debug --verbose"));
        assert_eq!(resolved.run_options(), Some("--debug --verbose"));
    }

    #[test]
    fn test_computed_evaluated_after_merge_per_job() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = Operation::command("simulate", "run").directives(Directives::new().computed(
            NP,
            move |job| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(job.statepoint().get("n").cloned().unwrap_or(json!(1)))
            },
        ));
        // A group override replaces the function, so it is never evaluated
        let group = Group::new("fixed").add_operation_with("simulate", Directives::new().with(NP, 16));
        let resolver = DirectiveResolver::new();

        let fixed = resolver.resolve(&op, &[&group], &make_job(json!({"n": 2}))).unwrap();
        assert_eq!(fixed.np(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let a = resolver.resolve(&op, &[], &make_job(json!({"n": 2}))).unwrap();
        let b = resolver.resolve(&op, &[], &make_job(json!({"n": 5}))).unwrap();
        assert_eq!(a.np(), 2);
        assert_eq!(b.np(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_computed_failure_reports_directive() {
        let op = Operation::command("simulate", "run")
            .directives(Directives::new().computed("walltime", |_| anyhow::bail!("no estimate")));
        let job = make_job(json!({"x": 1}));
        let err = DirectiveResolver::new().resolve(&op, &[], &job).unwrap_err();
        assert_eq!(err.job, job.id());
        assert_eq!(err.operation, "simulate");
        assert_eq!(err.directive, "walltime");
        assert!(err.reason.contains("no estimate"));
    }
}
