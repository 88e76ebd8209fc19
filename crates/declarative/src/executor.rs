//! Execution engine - applies plans in step order, independent plans in parallel

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback};
use crate::diff::compute_diffs;
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

/// Outcome of one step, keyed by resource id
type StepOutcome = (String, ApplyResult);

/// Execute plans with the given options and callbacks
///
/// # Type Parameters
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Arguments
/// * `plans` - The execution plans to run
/// * `opts` - Execution options (dry_run, jobs, verbose)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// # Returns
/// Summary of execution results
pub fn execute<P, C>(
    plans: Vec<ExecutionPlan>,
    opts: ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    // Compute diffs for reporting
    let total_changes: usize = plans.iter().map(|p| compute_diffs(p).len()).sum();

    if total_changes == 0 {
        return Ok(ExecuteSummary::default());
    }

    // Confirm before proceeding (unless dry_run)
    if !opts.dry_run && !confirm.confirm("Apply changes?")? {
        return Ok(ExecuteSummary {
            skipped: total_changes,
            ..Default::default()
        });
    }

    if opts.dry_run {
        return Ok(ExecuteSummary::default());
    }

    let mut summary = ExecuteSummary::default();

    let results = if opts.jobs <= 1 || plans.len() == 1 {
        let mut all = Vec::new();
        for plan in &plans {
            all.extend(run_plan(plan, opts.verbose, progress));
        }
        all
    } else {
        execute_parallel(&plans, opts.jobs, opts.verbose, progress)?
    };

    for (_, result) in &results {
        summary.add_result(result);
    }

    Ok(summary)
}

/// Apply every step of one plan in order
///
/// A step subscribed to a failed or skipped step is skipped. A step
/// subscribed to a step that changed is applied with `refresh` set.
fn run_plan<P: ProgressCallback + ?Sized>(
    plan: &ExecutionPlan,
    verbose: bool,
    progress: &mut P,
) -> Vec<StepOutcome> {
    progress.on_plan_start(&plan.name, plan.total_resources());

    let base = ApplyContext::new(false, verbose);
    let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(plan.total_resources());

    for step in plan.steps() {
        let resource = step.resource.as_ref();
        progress.on_resource_start(&resource.id(), &resource.description());

        let upstream: Vec<&StepOutcome> = step
            .subscribes_to
            .iter()
            .filter_map(|id| outcomes.get(id.index()))
            .collect();

        let blocked = upstream.iter().find_map(|(id, r)| match r {
            ApplyResult::Failed { .. } => Some(format!("Dependency {id} failed")),
            ApplyResult::Skipped { .. } => Some(format!("Dependency {id} was skipped")),
            _ => None,
        });

        let result = if let Some(reason) = blocked {
            ApplyResult::Skipped { reason }
        } else {
            let mut ctx = if upstream.iter().any(|(_, r)| r.is_change()) {
                log::debug!("{} refreshed by subscription", resource.id());
                base.refreshed()
            } else {
                base.clone()
            };
            apply_resource(resource, &mut ctx)
        };

        progress.on_resource_complete(&resource.id(), &result);
        outcomes.push((resource.id(), result));
    }

    progress.on_plan_complete(&plan.name);
    outcomes
}

/// Execute plans in parallel using rayon
fn execute_parallel<P: ProgressCallback>(
    plans: &[ExecutionPlan],
    jobs: usize,
    verbose: bool,
    progress: &mut P,
) -> Result<Vec<StepOutcome>> {
    // For parallel execution, we can't use the progress callback during iteration
    // because it's not thread-safe. We collect results and report after.
    let results: Arc<Mutex<Vec<(String, Vec<StepOutcome>)>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    pool.install(|| {
        plans.par_iter().for_each(|plan| {
            let outcomes = run_plan(plan, verbose, &mut crate::context::NoProgress);
            match results.lock() {
                Ok(mut locked) => locked.push((plan.name.clone(), outcomes)),
                Err(poisoned) => poisoned.into_inner().push((plan.name.clone(), outcomes)),
            }
        });
    });

    let results = Arc::try_unwrap(results)
        .map_err(|_| anyhow::anyhow!("Failed to unwrap results"))?
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    // Report results to progress callback
    let mut flat = Vec::new();
    for (name, outcomes) in results {
        progress.on_plan_start(&name, outcomes.len());
        for (id, result) in &outcomes {
            progress.on_resource_complete(id, result);
        }
        progress.on_plan_complete(&name);
        flat.extend(outcomes);
    }

    Ok(flat)
}

/// Apply a single resource
fn apply_resource(resource: &dyn Resource, ctx: &mut ApplyContext) -> ApplyResult {
    match resource.apply(ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(plans: Vec<ExecutionPlan>, opts: ExecuteOptions) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plans, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::types::ResourceState;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct TestResource {
        id: String,
        should_change: bool,
        fail: bool,
        skip: bool,
        saw_refresh: Arc<AtomicBool>,
    }

    impl TestResource {
        fn new(id: &str, should_change: bool) -> Self {
            Self {
                id: id.into(),
                should_change,
                fail: false,
                skip: false,
                saw_refresh: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Resource for TestResource {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn description(&self) -> String {
            format!("Test resource {}", self.id)
        }

        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn current_state(&self) -> Result<ResourceState> {
            if self.should_change {
                Ok(ResourceState::Absent)
            } else {
                Ok(ResourceState::Present { details: None })
            }
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
            if ctx.dry_run {
                return Ok(ApplyResult::Skipped {
                    reason: "Dry run".into(),
                });
            }
            self.saw_refresh.store(ctx.refresh, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            if self.skip {
                return Ok(ApplyResult::Skipped {
                    reason: "not applicable".into(),
                });
            }
            if self.should_change {
                Ok(ApplyResult::Created)
            } else {
                Ok(ApplyResult::NoChange)
            }
        }
    }

    #[test]
    fn test_execute_empty_plan() {
        let result = execute(
            vec![ExecutionPlan::new("empty")],
            ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_execute_no_changes() {
        let mut plan = ExecutionPlan::new("p");
        plan.add(Box::new(TestResource::new("test1", false)));

        let result = execute_simple(vec![plan], ExecuteOptions::default()).unwrap();

        // No diff means no execution
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_execute_with_changes() {
        let mut plan = ExecutionPlan::new("p");
        plan.add(Box::new(TestResource::new("test1", true)));

        let result = execute_simple(vec![plan], ExecuteOptions::default()).unwrap();

        assert_eq!(result.created, 1);
    }

    #[test]
    fn test_declined_confirmation_skips() {
        let mut plan = ExecutionPlan::new("p");
        plan.add(Box::new(TestResource::new("test1", true)));

        let result = execute(
            vec![plan],
            ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(result.total_changes(), 0);
    }

    #[test]
    fn test_subscriber_refreshed_after_change() {
        let subscriber = TestResource::new("file", false);
        let saw_refresh = Arc::clone(&subscriber.saw_refresh);

        let mut plan = ExecutionPlan::new("p");
        let stage = plan.add(Box::new(TestResource::new("stage", true)));
        plan.add_subscribed(Box::new(subscriber), &[stage]);

        let result = execute_simple(vec![plan], ExecuteOptions::default()).unwrap();

        assert_eq!(result.created, 1);
        assert_eq!(result.no_change, 1);
        assert!(saw_refresh.load(Ordering::SeqCst));
    }

    #[test]
    fn test_subscriber_skipped_after_failure() {
        let mut failing = TestResource::new("stage", true);
        failing.fail = true;

        let mut plan = ExecutionPlan::new("p");
        let stage = plan.add(Box::new(failing));
        plan.add_subscribed(Box::new(TestResource::new("file", true)), &[stage]);

        let result = execute_simple(vec![plan], ExecuteOptions::default()).unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_subscriber_skipped_after_skip() {
        let mut skipping = TestResource::new("stage", true);
        skipping.skip = true;
        let file = TestResource::new("file", true);
        let file_ran = Arc::clone(&file.saw_refresh);
        file_ran.store(true, Ordering::SeqCst);

        let mut plan = ExecutionPlan::new("p");
        let stage = plan.add(Box::new(skipping));
        plan.add_subscribed(Box::new(file), &[stage]);

        let result = execute_simple(vec![plan], ExecuteOptions::default()).unwrap();

        assert_eq!(result.skipped, 2);
        assert_eq!(result.created, 0);
        // apply() would have reset the flag
        assert!(file_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_parallel_plans() {
        let plans: Vec<_> = (0..3)
            .map(|i| {
                let mut plan = ExecutionPlan::new(format!("p{i}"));
                plan.add(Box::new(TestResource::new(&format!("r{i}"), true)));
                plan
            })
            .collect();

        let opts = ExecuteOptions {
            jobs: 2,
            ..Default::default()
        };
        let result = execute_simple(plans, opts).unwrap();

        assert_eq!(result.created, 3);
    }
}
