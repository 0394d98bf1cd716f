//! Approver resolver: expands a step's approver rule into nominees
//!
//! Resolution happens at dispatch time, against the directory's current
//! view of roles and actors. An empty result is an error the caller
//! must escalate — it is never treated as an automatic approval or a
//! silent skip.

use crate::{ResolveContext, RoleDirectory};
use approval_types::{ActorId, ApprovalError, ApprovalResult, ApproverRule, Step};

/// Expands approver rules into concrete nominee sets
#[derive(Clone, Debug, Default)]
pub struct ApproverResolver;

impl ApproverResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a step's nominees.
    ///
    /// Duplicates are removed preserving first-appearance order, so a
    /// user holding two referenced roles gets one task. Fails with
    /// `NoEligibleApprover` when the result is empty.
    pub fn resolve(
        &self,
        step: &Step,
        context: &ResolveContext,
        directory: &dyn RoleDirectory,
    ) -> ApprovalResult<Vec<ActorId>> {
        let raw = match &step.approver_rule {
            ApproverRule::Roles(roles) => roles
                .iter()
                .flat_map(|role| directory.active_actors_with_role(role))
                .collect(),
            ApproverRule::Users(users) => users.clone(),
            ApproverRule::Dynamic(rule) => directory
                .resolve_dynamic_rule(rule, context)
                .ok_or_else(|| {
                    ApprovalError::Validation(format!("unknown dynamic approver rule '{}'", rule))
                })?,
        };

        let mut nominees: Vec<ActorId> = Vec::with_capacity(raw.len());
        for actor in raw {
            if !nominees.contains(&actor) {
                nominees.push(actor);
            }
        }

        if nominees.is_empty() {
            return Err(ApprovalError::NoEligibleApprover {
                step: step.step_number,
            });
        }
        Ok(nominees)
    }
}
