//! Approval Workflow Domain Types
//!
//! Approval workflows here are NOT free-form process diagrams. They are
//! **ordered step chains** over a business document: each step is gated
//! by a condition over a snapshot of the document's fields, resolves to
//! a set of nominated approvers, and completes under a quorum policy.
//!
//! # Key Concepts
//!
//! - **WorkflowDefinition**: A versioned, immutable blueprint — an
//!   ordered list of steps for one target entity kind. Edits never
//!   mutate a published version; they produce a new one.
//! - **WorkflowInstance**: One running execution of a definition against
//!   one document, bound to the definition version active at start.
//! - **Step**: One stage of a definition; may be conditionally
//!   inapplicable, auto-approved, or dispatched to nominees.
//! - **ApprovalTask**: One nominee's pending decision within a step of
//!   an instance. Closed exactly once.
//! - **ConditionSet**: AND-within-group, OR-across-groups comparisons
//!   against the document's field snapshot.
//!
//! # Design Principles
//!
//! 1. Definitions are append-only versions. Running instances keep the
//!    version they started with.
//! 2. Terminal outcomes are final. Re-submission is a new instance.
//! 3. Every transition is recorded in the instance history.
//! 4. An empty approver set is an error, never an implicit approval.

#![deny(unsafe_code)]

mod actor;
mod condition;
mod definition;
mod errors;
mod events;
mod instance;
mod task;

pub use actor::*;
pub use condition::*;
pub use definition::*;
pub use errors::*;
pub use events::*;
pub use instance::*;
pub use task::*;
