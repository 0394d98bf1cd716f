//! Error types for the approval workflow engine

use crate::{ActorId, DefinitionId, DocumentRef, InstanceId, TaskId};

/// Errors that can occur in approval workflow operations
///
/// Every rejected transition carries a machine-distinguishable kind so
/// the surrounding layer can present a precise message. Unknown field
/// paths in conditions are NOT errors — they evaluate the condition to
/// false.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(DefinitionId),

    #[error("workflow definition is not active: {0}")]
    DefinitionInactive(DefinitionId),

    #[error("workflow instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("approval task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("no eligible approver for step {step}")]
    NoEligibleApprover { step: u32 },

    #[error("document already has an active workflow instance: {0}")]
    InstanceAlreadyActive(DocumentRef),

    #[error("task was already decided: {0}")]
    AlreadyDecided(TaskId),

    #[error("self-approval is not permitted for {0} on this step")]
    SelfApprovalForbidden(ActorId),

    #[error("{0} is not an eligible approver for this task")]
    NotEligible(ActorId),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Result type alias for approval workflow operations
pub type ApprovalResult<T> = Result<T, ApprovalError>;
