//! Approval Workflow Engine Runtime
//!
//! The engine drives multi-step, conditionally-gated approval over
//! arbitrary business documents. It advances instances step by step,
//! applies quorum policy to decide step completion, and finalizes
//! instances with auditable terminal outcomes.
//!
//! # Key Principle
//!
//! **The engine coordinates, it never decides.**
//!
//! Whether a step applies is answered by the document's field snapshot;
//! who must decide is answered by the role directory; the decisions
//! themselves come from external actors. The engine only enforces the
//! rules between those answers.
//!
//! # Architecture
//!
//! The [`ApprovalEngine`] composes specialized components:
//!
//! - [`DefinitionStore`] — Append-only, versioned workflow definitions
//! - [`ConditionEvaluator`] — Pure step-applicability evaluation
//! - [`ApproverResolver`] — Expands approver rules into nominee sets
//! - [`TaskLedger`] — Opens and closes tasks, exactly once each
//! - [`SlaClock`] — Passive read model flagging overdue tasks
//!
//! # Example
//!
//! ```rust
//! use approval_engine::{ApprovalEngine, InMemoryDirectory, InMemoryDocuments, NullSink};
//! use approval_types::*;
//! use std::sync::Arc;
//!
//! // Collaborators: the document's fields and the role directory
//! let mut documents = InMemoryDocuments::new();
//! documents.insert(
//!     DocumentRef::new("po-1001"),
//!     FieldSnapshot::new().with_field("total", 250_000i64),
//!     ActorId::new("dana"),
//! );
//! let mut directory = InMemoryDirectory::new();
//! directory.grant_role(RoleId::new("supervisor"), ActorId::new("sam"));
//!
//! let mut engine = ApprovalEngine::new(
//!     Arc::new(documents),
//!     Arc::new(directory),
//!     Arc::new(NullSink),
//! );
//!
//! // A one-step process: any one supervisor decides
//! let definition = WorkflowDefinition::new("PO Approval", "purchase_order")
//!     .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor")));
//! let definition_id = engine.publish_definition(definition).unwrap();
//!
//! let instance_id = engine
//!     .start(&definition_id, DocumentRef::new("po-1001"), ActorId::new("dana"))
//!     .unwrap();
//!
//! let task_id = engine.open_tasks_for(&ActorId::new("sam"))[0].id.clone();
//! engine
//!     .decide(&task_id, DecisionOutcome::Approve, &ActorId::new("sam"), None)
//!     .unwrap();
//!
//! assert!(engine.instance(&instance_id).unwrap().is_terminal());
//! ```

#![deny(unsafe_code)]

pub mod collaborators;
pub mod definition_store;
pub mod engine;
pub mod evaluator;
pub mod ledger;
pub mod resolver;
pub mod sla;

// Re-export main types
pub use collaborators::{
    DocumentProvider, InMemoryDirectory, InMemoryDocuments, MemorySink, NotificationSink,
    NullSink, ResolveContext, RoleDirectory,
};
pub use definition_store::DefinitionStore;
pub use engine::ApprovalEngine;
pub use evaluator::ConditionEvaluator;
pub use ledger::{DecisionContext, TaskLedger};
pub use resolver::ApproverResolver;
pub use sla::{SlaBreach, SlaClock};
