//! Workflow definitions: the versioned blueprint of an approval process
//!
//! A WorkflowDefinition is an ordered chain of steps for one target
//! entity kind. Definitions are immutable once published — edits go
//! through the store and produce a new version, so instances already
//! running keep the version they were started with.

use crate::{ActorId, ApprovalError, ApprovalResult, ConditionSet, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for one published definition version
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionId(pub String);

impl DefinitionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// A workflow definition — one version of an approval process blueprint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier of this version
    pub id: DefinitionId,
    /// Process name; together with the entity kind it identifies the
    /// process across versions
    pub name: String,
    /// The kind of business document this process approves
    /// (e.g. "purchase_order", "vendor_audit")
    pub target_entity_kind: String,
    /// Monotonic version, assigned by the definition store
    pub version: u32,
    /// Whether new instances may be started from this version
    pub is_active: bool,
    /// Description of what this process approves
    pub description: String,
    /// The ordered approval steps
    pub steps: Vec<Step>,
    /// When this version was published
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create a new draft definition. The store assigns the final
    /// version number at publication.
    pub fn new(name: impl Into<String>, target_entity_kind: impl Into<String>) -> Self {
        Self {
            id: DefinitionId::generate(),
            name: name.into(),
            target_entity_kind: target_entity_kind.into(),
            version: 1,
            is_active: true,
            description: String::new(),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Add a step to the chain
    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Get a step by its number
    pub fn step(&self, step_number: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// The highest step number in the chain
    pub fn last_step_number(&self) -> u32 {
        self.steps.iter().map(|s| s.step_number).max().unwrap_or(0)
    }

    /// Total number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Validate the definition for structural correctness.
    ///
    /// Step numbers must be unique and contiguous starting at 1, and
    /// the chain must not be empty.
    pub fn validate(&self) -> ApprovalResult<()> {
        if self.steps.is_empty() {
            return Err(ApprovalError::Validation(
                "definition must have at least one step".into(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_number) {
                return Err(ApprovalError::Validation(format!(
                    "duplicate step number {}",
                    step.step_number
                )));
            }
            step.validate()?;
        }

        for expected in 1..=self.steps.len() as u32 {
            if !seen.contains(&expected) {
                return Err(ApprovalError::Validation(format!(
                    "step numbers must be contiguous from 1; missing {}",
                    expected
                )));
            }
        }

        Ok(())
    }
}

// ── Step ─────────────────────────────────────────────────────────────

/// One stage of an approval process
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    /// Order key within the definition, starting at 1
    pub step_number: u32,
    /// Human-readable name ("Supervisor review", "CFO sign-off")
    pub name: String,
    /// How nominees are determined when the step dispatches
    pub approver_rule: ApproverRule,
    /// How many task approvals satisfy the step
    pub quorum: QuorumPolicy,
    /// Whether the document's initiator may decide their own item
    pub allow_self_approval: bool,
    /// Hours before an open task is flagged as breached; 0 = no deadline
    pub sla_hours: u32,
    /// Applicability gate; empty ⇒ the step always applies
    pub conditions: ConditionSet,
    /// If present and satisfied by the snapshot, the step completes
    /// without dispatching any task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approval: Option<ConditionSet>,
}

impl Step {
    pub fn new(step_number: u32, name: impl Into<String>, approver_rule: ApproverRule) -> Self {
        Self {
            step_number,
            name: name.into(),
            approver_rule,
            quorum: QuorumPolicy::AnyOne,
            allow_self_approval: false,
            sla_hours: 0,
            conditions: ConditionSet::always(),
            auto_approval: None,
        }
    }

    pub fn with_quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn with_self_approval(mut self) -> Self {
        self.allow_self_approval = true;
        self
    }

    pub fn with_sla_hours(mut self, hours: u32) -> Self {
        self.sla_hours = hours;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_auto_approval(mut self, conditions: ConditionSet) -> Self {
        self.auto_approval = Some(conditions);
        self
    }

    /// Validate the step's own configuration
    pub fn validate(&self) -> ApprovalResult<()> {
        if self.step_number == 0 {
            return Err(ApprovalError::Validation(
                "step numbers start at 1".into(),
            ));
        }
        match &self.approver_rule {
            ApproverRule::Roles(roles) if roles.is_empty() => Err(ApprovalError::Validation(
                format!("step {} references no roles", self.step_number),
            )),
            ApproverRule::Users(users) if users.is_empty() => Err(ApprovalError::Validation(
                format!("step {} lists no users", self.step_number),
            )),
            ApproverRule::Dynamic(rule) if rule.trim().is_empty() => Err(
                ApprovalError::Validation(format!("step {} has an empty dynamic rule", self.step_number)),
            ),
            _ => Ok(()),
        }
    }
}

// ── Approver Rule ────────────────────────────────────────────────────

/// How a step's nominees are determined at dispatch time
///
/// A closed union — the engine never carries free-form approver
/// payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ApproverRule {
    /// All active actors holding any of the referenced roles
    Roles(Vec<RoleId>),
    /// An explicit list of actors
    Users(Vec<ActorId>),
    /// A named rule resolved by the actor directory
    /// (e.g. "line_manager_of_initiator")
    Dynamic(String),
}

impl ApproverRule {
    pub fn role(role: impl Into<String>) -> Self {
        Self::Roles(vec![RoleId::new(role)])
    }

    pub fn user(user: impl Into<String>) -> Self {
        Self::Users(vec![ActorId::new(user)])
    }

    pub fn dynamic(rule: impl Into<String>) -> Self {
        Self::Dynamic(rule.into())
    }
}

// ── Quorum Policy ────────────────────────────────────────────────────

/// How many task approvals satisfy a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuorumPolicy {
    /// The first approval satisfies the step; open sibling tasks are
    /// superseded
    #[default]
    AnyOne,
    /// Every opened task must be approved
    All,
}
