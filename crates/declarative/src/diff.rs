//! Diff computation for resources

use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::ResourceState;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A diff between current and desired state of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Name of the plan the resource belongs to
    pub plan: String,
    /// Unique identifier of the resource
    pub resource_id: String,
    /// Type of the resource
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    /// Current state
    pub current: ResourceState,
    /// Desired state
    pub desired: ResourceState,
    /// Ids of the steps this resource subscribes to
    pub subscribes_to: Vec<String>,
}

impl ResourceDiff {
    /// Create a diff from a resource, returning None if no changes needed
    pub fn from_resource(plan: &str, resource: &dyn Resource) -> Result<Option<Self>> {
        let current = resource.current_state()?;
        let desired = resource.desired_state();

        if current == desired {
            return Ok(None);
        }

        Ok(Some(Self {
            plan: plan.to_string(),
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            current,
            desired,
            subscribes_to: Vec::new(),
        }))
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Present { .. }, ResourceState::Absent)
        )
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Modified { .. }, _) | (_, ResourceState::Modified { .. })
        ) || matches!(
            (&self.current, &self.desired),
            (
                ResourceState::Present { details: Some(_) },
                ResourceState::Present { details: Some(_) }
            )
        )
    }
}

/// Compute diffs for every step of a plan
///
/// A resource whose current state cannot be read is reported with
/// `ResourceState::Unknown` rather than dropped, so it still gets applied
/// and surfaces its error there.
pub fn compute_diffs(plan: &ExecutionPlan) -> Vec<ResourceDiff> {
    plan.steps()
        .iter()
        .filter_map(|step| {
            let resource = step.resource.as_ref();
            let diff = match ResourceDiff::from_resource(&plan.name, resource) {
                Ok(diff) => diff,
                Err(e) => {
                    log::debug!("state of {} unreadable: {e:#}", resource.id());
                    Some(ResourceDiff {
                        plan: plan.name.clone(),
                        resource_id: resource.id(),
                        resource_type: resource.resource_type().to_string(),
                        description: resource.description(),
                        current: ResourceState::Unknown,
                        desired: resource.desired_state(),
                        subscribes_to: Vec::new(),
                    })
                }
            };
            diff.map(|mut d| {
                d.subscribes_to = step
                    .subscribes_to
                    .iter()
                    .filter_map(|id| plan.step(*id))
                    .map(|s| s.resource.id())
                    .collect();
                d
            })
        })
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by plan name
pub fn group_by_plan(
    diffs: &[ResourceDiff],
) -> std::collections::BTreeMap<String, Vec<&ResourceDiff>> {
    let mut groups: std::collections::BTreeMap<String, Vec<&ResourceDiff>> =
        std::collections::BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.plan.clone()).or_default().push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ApplyContext;
    use crate::types::ApplyResult;

    #[derive(Debug)]
    struct Fixed {
        id: &'static str,
        current: Option<ResourceState>,
        desired: ResourceState,
    }

    impl Resource for Fixed {
        fn id(&self) -> String {
            self.id.to_string()
        }
        fn description(&self) -> String {
            format!("fixed {}", self.id)
        }
        fn resource_type(&self) -> &'static str {
            "file"
        }
        fn current_state(&self) -> Result<ResourceState> {
            self.current
                .clone()
                .ok_or_else(|| anyhow::anyhow!("unknown user 'tomcat'"))
        }
        fn desired_state(&self) -> ResourceState {
            self.desired.clone()
        }
        fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
            Ok(ApplyResult::NoChange)
        }
    }

    #[test]
    fn test_diffs_skip_converged_and_keep_unreadable() {
        let mut plan = ExecutionPlan::new("sample.jar");
        let first = plan.add(Box::new(Fixed {
            id: "a",
            current: Some(ResourceState::Absent),
            desired: ResourceState::Absent,
        }));
        plan.add_subscribed(
            Box::new(Fixed {
                id: "b",
                current: None,
                desired: ResourceState::Present { details: None },
            }),
            &[first],
        );

        let diffs = compute_diffs(&plan);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].resource_id, "b");
        assert_eq!(diffs[0].current, ResourceState::Unknown);
        assert_eq!(diffs[0].subscribes_to, vec!["a".to_string()]);
    }

    #[test]
    fn test_summary_classification() {
        let mut plan = ExecutionPlan::new("sample.jar");
        plan.add(Box::new(Fixed {
            id: "add",
            current: Some(ResourceState::Absent),
            desired: ResourceState::Present { details: None },
        }));
        plan.add(Box::new(Fixed {
            id: "rm",
            current: Some(ResourceState::Present { details: None }),
            desired: ResourceState::Absent,
        }));
        plan.add(Box::new(Fixed {
            id: "mod",
            current: Some(ResourceState::Modified {
                from: "0644".into(),
                to: "0640".into(),
            }),
            desired: ResourceState::Present { details: None },
        }));

        let diffs = compute_diffs(&plan);
        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.removals, 1);
        assert_eq!(summary.modifications, 1);
        assert!(summary.has_changes());
        assert_eq!(group_by_plan(&diffs).len(), 1);
    }
}
