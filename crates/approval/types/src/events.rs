//! Engine events delivered to the notification sink
//!
//! Events are fire-and-forget: a delivery failure is logged by the
//! engine and never rolls back the state transition that produced it.

use crate::{ActorId, DecisionOutcome, DocumentRef, InstanceId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event emitted by the engine after a state transition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A task was opened for a nominee
    TaskOpened {
        instance_id: InstanceId,
        task_id: TaskId,
        step_number: u32,
        nominee: ActorId,
        at: DateTime<Utc>,
    },
    /// A nominee decided a task
    TaskDecided {
        instance_id: InstanceId,
        task_id: TaskId,
        step_number: u32,
        actor: ActorId,
        outcome: DecisionOutcome,
        at: DateTime<Utc>,
    },
    /// The instance reached its approved terminal state
    InstanceApproved {
        instance_id: InstanceId,
        document: DocumentRef,
        at: DateTime<Utc>,
    },
    /// The instance was rejected
    InstanceRejected {
        instance_id: InstanceId,
        document: DocumentRef,
        at: DateTime<Utc>,
    },
    /// The instance was cancelled
    InstanceCancelled {
        instance_id: InstanceId,
        document: DocumentRef,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// The instance this event belongs to
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            Self::TaskOpened { instance_id, .. }
            | Self::TaskDecided { instance_id, .. }
            | Self::InstanceApproved { instance_id, .. }
            | Self::InstanceRejected { instance_id, .. }
            | Self::InstanceCancelled { instance_id, .. } => instance_id,
        }
    }
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskOpened { task_id, nominee, .. } => {
                write!(f, "task_opened:{}:{}", task_id, nominee)
            }
            Self::TaskDecided { task_id, outcome, .. } => {
                write!(f, "task_decided:{}:{:?}", task_id, outcome)
            }
            Self::InstanceApproved { instance_id, .. } => {
                write!(f, "instance_approved:{}", instance_id)
            }
            Self::InstanceRejected { instance_id, .. } => {
                write!(f, "instance_rejected:{}", instance_id)
            }
            Self::InstanceCancelled { instance_id, .. } => {
                write!(f, "instance_cancelled:{}", instance_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_accessor() {
        let event = EngineEvent::InstanceApproved {
            instance_id: InstanceId::new("inst-1"),
            document: DocumentRef::new("doc-1"),
            at: Utc::now(),
        };
        assert_eq!(event.instance_id(), &InstanceId::new("inst-1"));
    }

    #[test]
    fn test_display() {
        let event = EngineEvent::InstanceRejected {
            instance_id: InstanceId::new("inst-9"),
            document: DocumentRef::new("doc-9"),
            at: Utc::now(),
        };
        assert_eq!(format!("{}", event), "instance_rejected:inst-9");
    }
}
