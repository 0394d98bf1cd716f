//! Workflow instances: running executions of a definition
//!
//! An instance binds one document to one definition version and walks
//! the step chain. Every transition is appended to the instance
//! history, which is the audit record of what happened and who caused
//! it.

use crate::{ActorId, DecisionOutcome, DefinitionId, DocumentRef, FieldSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
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

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Instance Status ──────────────────────────────────────────────────

/// The lifecycle status of a workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InstanceStatus {
    /// Awaiting decisions
    #[default]
    Pending,
    /// Every applicable step was satisfied
    Approved,
    /// A nominee rejected; the whole instance fails
    Rejected,
    /// Cancelled by an authorized actor
    Cancelled,
}

impl InstanceStatus {
    /// Terminal statuses are final — an instance is never re-opened
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

// ── Workflow Instance ────────────────────────────────────────────────

/// A running (or finished) execution of a definition against a document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier
    pub id: InstanceId,
    /// The definition version this instance is bound to
    pub definition_id: DefinitionId,
    /// The target business document
    pub document: DocumentRef,
    /// Who started the instance (the document's author)
    pub initiator: ActorId,
    /// The step currently awaiting decisions (or the next to dispatch)
    pub current_step: u32,
    /// Current status
    pub status: InstanceStatus,
    /// Field values captured at start; all conditions evaluate against
    /// this snapshot
    pub snapshot: FieldSnapshot,
    /// Append-only record of everything that happened
    pub history: Vec<HistoryEntry>,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance was last updated
    pub updated_at: DateTime<Utc>,
    /// When the instance reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Create a new pending instance at step 1
    pub fn new(
        definition_id: DefinitionId,
        document: DocumentRef,
        initiator: ActorId,
        snapshot: FieldSnapshot,
    ) -> Self {
        let now = Utc::now();
        let mut instance = Self {
            id: InstanceId::generate(),
            definition_id,
            document,
            initiator: initiator.clone(),
            current_step: 1,
            status: InstanceStatus::Pending,
            snapshot,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        instance.record(
            HistoryEvent::InstanceStarted,
            Some(initiator),
            "instance started",
        );
        instance
    }

    // ── Step progression ─────────────────────────────────────────────

    /// Move the cursor to the next step
    pub fn advance_step(&mut self) {
        self.current_step += 1;
        self.updated_at = Utc::now();
    }

    /// Record that the current step opened tasks
    pub fn record_dispatched(&mut self, step_number: u32, task_count: usize) {
        self.record(
            HistoryEvent::StepDispatched {
                step_number,
                task_count,
            },
            None,
            format!("step {} dispatched {} task(s)", step_number, task_count),
        );
    }

    /// Record that a step completed via its auto-approval rule
    pub fn record_auto_approved(&mut self, step_number: u32) {
        self.record(
            HistoryEvent::StepAutoApproved { step_number },
            None,
            format!("step {} auto-approved", step_number),
        );
    }

    /// Record that a step was inapplicable and skipped
    pub fn record_skipped(&mut self, step_number: u32) {
        self.record(
            HistoryEvent::StepSkipped { step_number },
            None,
            format!("step {} skipped (conditions not met)", step_number),
        );
    }

    /// Record that a step's quorum was satisfied
    pub fn record_step_satisfied(&mut self, step_number: u32) {
        self.record(
            HistoryEvent::StepSatisfied { step_number },
            None,
            format!("step {} satisfied", step_number),
        );
    }

    /// Record an individual task decision
    pub fn record_decision(
        &mut self,
        step_number: u32,
        actor: ActorId,
        outcome: DecisionOutcome,
        reason: Option<&str>,
    ) {
        let detail = match reason {
            Some(reason) => format!("step {}: {:?} ({})", step_number, outcome, reason),
            None => format!("step {}: {:?}", step_number, outcome),
        };
        self.record(
            HistoryEvent::TaskDecided {
                step_number,
                outcome,
            },
            Some(actor),
            detail,
        );
    }

    // ── Terminal transitions ─────────────────────────────────────────

    /// All applicable steps satisfied
    pub fn approve(&mut self) {
        self.finalize(InstanceStatus::Approved);
        self.record(HistoryEvent::InstanceApproved, None, "instance approved");
    }

    /// A rejection fails the whole instance
    pub fn reject(&mut self, actor: ActorId, reason: &str) {
        self.finalize(InstanceStatus::Rejected);
        self.record(
            HistoryEvent::InstanceRejected,
            Some(actor),
            format!("instance rejected: {}", reason),
        );
    }

    /// Cancelled while pending
    pub fn cancel(&mut self, actor: ActorId, reason: &str) {
        self.finalize(InstanceStatus::Cancelled);
        self.record(
            HistoryEvent::InstanceCancelled,
            Some(actor),
            format!("instance cancelled: {}", reason),
        );
    }

    fn finalize(&mut self, status: InstanceStatus) {
        let now = Utc::now();
        self.status = status;
        self.closed_at = Some(now);
        self.updated_at = now;
    }

    // ── Query methods ────────────────────────────────────────────────

    pub fn is_pending(&self) -> bool {
        self.status == InstanceStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Step numbers that actually dispatched tasks, in order
    pub fn dispatched_steps(&self) -> Vec<u32> {
        self.history
            .iter()
            .filter_map(|entry| match entry.event {
                HistoryEvent::StepDispatched { step_number, .. } => Some(step_number),
                _ => None,
            })
            .collect()
    }

    /// Step numbers that were skipped as inapplicable, in order
    pub fn skipped_steps(&self) -> Vec<u32> {
        self.history
            .iter()
            .filter_map(|entry| match entry.event {
                HistoryEvent::StepSkipped { step_number } => Some(step_number),
                _ => None,
            })
            .collect()
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn record(&mut self, event: HistoryEvent, actor: Option<ActorId>, detail: impl Into<String>) {
        self.history.push(HistoryEntry {
            sequence: self.history.len() as u64,
            event,
            timestamp: Utc::now(),
            actor,
            detail: detail.into(),
        });
    }
}

// ── History ──────────────────────────────────────────────────────────

/// One entry in the instance's append-only history
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// What happened
    pub event: HistoryEvent,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Who caused it (if attributable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,
    /// Human-readable detail
    pub detail: String,
}

/// The kind of a history entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// The instance was started
    InstanceStarted,
    /// A step opened tasks for its nominees
    StepDispatched { step_number: u32, task_count: usize },
    /// A step completed via its auto-approval rule, without tasks
    StepAutoApproved { step_number: u32 },
    /// A step was inapplicable and skipped
    StepSkipped { step_number: u32 },
    /// A step's quorum was satisfied
    StepSatisfied { step_number: u32 },
    /// A nominee decided a task
    TaskDecided {
        step_number: u32,
        outcome: DecisionOutcome,
    },
    /// Terminal: approved
    InstanceApproved,
    /// Terminal: rejected
    InstanceRejected,
    /// Terminal: cancelled
    InstanceCancelled,
}
