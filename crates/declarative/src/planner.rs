//! Execution planner - builds ordered resource plans
//!
//! A plan is an ordered list of steps. A step may subscribe to earlier
//! steps: it always runs after them, is skipped when one of them fails,
//! and is applied with `refresh` set when one of them changed something.

use crate::resource::{BoxedResource, Resource};

/// Handle to a step previously added to a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepId(usize);

impl StepId {
    /// Position of the step in its plan
    pub fn index(self) -> usize {
        self.0
    }
}

/// One step of a plan
#[derive(Debug)]
pub struct PlanStep {
    /// The resource converged by this step
    pub resource: BoxedResource,
    /// Earlier steps this one subscribes to
    pub subscribes_to: Vec<StepId>,
}

/// An ordered execution plan for one declaration
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Name of the declaration this plan realizes
    pub name: String,
    steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step with no dependencies
    pub fn add(&mut self, resource: BoxedResource) -> StepId {
        self.add_subscribed(resource, &[])
    }

    /// Append a step that subscribes to earlier steps
    ///
    /// Step ids are only handed out by this plan, so a subscription can
    /// never point forward.
    pub fn add_subscribed(&mut self, resource: BoxedResource, subscribes_to: &[StepId]) -> StepId {
        let id = StepId(self.steps.len());
        self.steps.push(PlanStep {
            resource,
            subscribes_to: subscribes_to.to_vec(),
        });
        id
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Look up a step by id
    pub fn step(&self, id: StepId) -> Option<&PlanStep> {
        self.steps.get(id.0)
    }

    /// Whether any step of this plan matches a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn matches_target(&self, target: Option<&str>) -> bool {
        match target {
            None => true,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.steps.iter().any(|s| {
                    matches_filter(
                        s.resource.as_ref(),
                        &self.name,
                        resource_type.as_deref(),
                        name.as_deref(),
                    )
                })
            }
        }
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.steps.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Keep only the plans matching a target pattern
pub fn filter_by_target(plans: Vec<ExecutionPlan>, target: Option<&str>) -> Vec<ExecutionPlan> {
    plans
        .into_iter()
        .filter(|p| p.matches_target(target))
        .collect()
}

/// Parse a target string like "type.name" into (type, name)
///
/// Jar names contain a dot themselves, so only the first dot splits.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((t, n)) if is_type_alias(t) => (Some(t.to_string()), Some(n.to_string())),
        Some(_) => (None, Some(target.to_string())),
    }
}

fn is_type_alias(t: &str) -> bool {
    matches!(t, "jars" | "archives" | "jar_archive" | "files" | "file")
}

/// Check if a resource matches the filter criteria
fn matches_filter(
    resource: &dyn Resource,
    plan_name: &str,
    resource_type: Option<&str>,
    name: Option<&str>,
) -> bool {
    if let Some(rt) = resource_type {
        // Allow common aliases
        let matches_type = match rt {
            "jars" => true,
            "archives" => resource.resource_type() == "jar_archive",
            "files" => resource.resource_type() == "file",
            _ if is_type_alias(rt) => resource.resource_type() == rt,
            // A bare word that is not a type names a declaration
            _ => plan_name == rt || resource.id().contains(rt),
        };
        if !matches_type {
            return false;
        }
    }

    if let Some(n) = name
        && !(plan_name == n || resource.id().contains(n))
    {
        return false;
    }

    true
}
