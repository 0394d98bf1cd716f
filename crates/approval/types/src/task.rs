//! Approval tasks: one nominee's pending decision within a step
//!
//! A task is created OPEN when its step dispatches and is closed
//! exactly once. The open→closed transition is the engine's
//! concurrency authority: whichever close lands first wins, and every
//! later attempt is rejected.

use crate::{ActorId, ApprovalError, ApprovalResult, InstanceId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for an approval task
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
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

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Decision Outcome ─────────────────────────────────────────────────

/// The outcome an actor submits for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    Approve,
    Reject,
}

// ── Task Status ──────────────────────────────────────────────────────

/// Lifecycle status of an approval task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    /// Awaiting a decision
    #[default]
    Open,
    /// Approved by its nominee
    Approved,
    /// Rejected by its nominee
    Rejected,
    /// Closed without a decision because its deadline passed and the
    /// surrounding layer expired it explicitly
    Expired,
    /// Closed without a decision because a sibling satisfied the step,
    /// or the instance was rejected or cancelled
    Superseded,
}

impl TaskStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

// ── Approval Task ────────────────────────────────────────────────────

/// One nominee's decision slot within a step of an instance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalTask {
    /// Unique task identifier
    pub id: TaskId,
    /// The instance this task belongs to
    pub instance_id: InstanceId,
    /// The step within the instance
    pub step_number: u32,
    /// The actor nominated to decide
    pub nominee: ActorId,
    /// Current status
    pub status: TaskStatus,
    /// When the task was opened
    pub dispatched_at: DateTime<Utc>,
    /// When the task was closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Who closed the task (set only for Approved/Rejected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ActorId>,
    /// Stated reason; required for rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// SLA window in hours; 0 = no deadline
    pub sla_hours: u32,
}

impl ApprovalTask {
    /// Open a new task for a nominee
    pub fn open(
        instance_id: InstanceId,
        step_number: u32,
        nominee: ActorId,
        sla_hours: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            instance_id,
            step_number,
            nominee,
            status: TaskStatus::Open,
            dispatched_at: now,
            decided_at: None,
            decided_by: None,
            reason: None,
            sla_hours,
        }
    }

    /// Close the task as approved. Fails unless the task is still open.
    pub fn approve(&mut self, actor: ActorId, reason: Option<String>, now: DateTime<Utc>) -> ApprovalResult<()> {
        self.close(TaskStatus::Approved, Some(actor), reason, now)
    }

    /// Close the task as rejected. A non-blank reason is required.
    pub fn reject(&mut self, actor: ActorId, reason: String, now: DateTime<Utc>) -> ApprovalResult<()> {
        if reason.trim().is_empty() {
            return Err(ApprovalError::Validation(
                "a reason is required to reject".into(),
            ));
        }
        self.close(TaskStatus::Rejected, Some(actor), Some(reason), now)
    }

    /// Close the task as superseded (no decision recorded)
    pub fn supersede(&mut self, now: DateTime<Utc>) -> ApprovalResult<()> {
        self.close(TaskStatus::Superseded, None, None, now)
    }

    /// Close the task as expired (no decision recorded)
    pub fn expire(&mut self, now: DateTime<Utc>) -> ApprovalResult<()> {
        self.close(TaskStatus::Expired, None, None, now)
    }

    /// The single open→closed transition; first close wins
    fn close(
        &mut self,
        status: TaskStatus,
        actor: Option<ActorId>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<()> {
        if self.status != TaskStatus::Open {
            return Err(ApprovalError::AlreadyDecided(self.id.clone()));
        }
        self.status = status;
        self.decided_at = Some(now);
        self.decided_by = actor;
        self.reason = reason;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status == TaskStatus::Open
    }

    /// The deadline derived from the SLA window; None when no deadline
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        if self.sla_hours == 0 {
            None
        } else {
            Some(self.dispatched_at + Duration::hours(self.sla_hours as i64))
        }
    }

    /// Whether the task is open past its deadline.
    ///
    /// Breach is observability only: a breached task stays decidable.
    pub fn is_breached(&self, now: DateTime<Utc>) -> bool {
        match (self.is_open(), self.deadline()) {
            (true, Some(deadline)) => now > deadline,
            _ => false,
        }
    }
}
