//! Collaborator contracts: the narrow seams to the surrounding system
//!
//! The engine owns no documents, no user directory, and no delivery
//! channel. It consumes these through three small traits, injected at
//! construction. In-memory implementations are provided for tests and
//! embedding.

use approval_types::{
    ActorId, ApprovalError, ApprovalResult, DocumentRef, EngineEvent, FieldSnapshot, RoleId,
};
use std::collections::HashMap;
use std::sync::Mutex;

// ── Resolve Context ──────────────────────────────────────────────────

/// Request-scoped context handed to the directory when resolving
/// dynamic approver rules
#[derive(Clone, Debug)]
pub struct ResolveContext {
    /// The document under approval
    pub document: DocumentRef,
    /// The document's initiator
    pub initiator: ActorId,
}

// ── Traits ───────────────────────────────────────────────────────────

/// Owner of the target business documents
pub trait DocumentProvider: Send + Sync {
    /// Capture the document's relevant field values
    fn field_snapshot(&self, document: &DocumentRef) -> ApprovalResult<FieldSnapshot>;

    /// The actor who authored the document
    fn initiator(&self, document: &DocumentRef) -> ApprovalResult<ActorId>;
}

/// The external role/actor directory
pub trait RoleDirectory: Send + Sync {
    /// All active actors currently holding a role
    fn active_actors_with_role(&self, role: &RoleId) -> Vec<ActorId>;

    /// Expand a named dynamic rule (e.g. "line_manager_of_initiator").
    /// Returns None when the rule is unknown to the directory.
    fn resolve_dynamic_rule(&self, _rule: &str, _context: &ResolveContext) -> Option<Vec<ActorId>> {
        None
    }
}

/// Fire-and-forget event delivery.
///
/// A delivery failure is logged by the engine and never rolls back the
/// state transition that produced the event.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &EngineEvent) -> Result<(), String>;
}

// ── In-memory implementations ────────────────────────────────────────

/// A document provider backed by a map — for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryDocuments {
    documents: HashMap<DocumentRef, (FieldSnapshot, ActorId)>,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: DocumentRef, snapshot: FieldSnapshot, initiator: ActorId) {
        self.documents.insert(document, (snapshot, initiator));
    }
}

impl DocumentProvider for InMemoryDocuments {
    fn field_snapshot(&self, document: &DocumentRef) -> ApprovalResult<FieldSnapshot> {
        self.documents
            .get(document)
            .map(|(snapshot, _)| snapshot.clone())
            .ok_or_else(|| ApprovalError::Persistence(format!("unknown document {}", document)))
    }

    fn initiator(&self, document: &DocumentRef) -> ApprovalResult<ActorId> {
        self.documents
            .get(document)
            .map(|(_, initiator)| initiator.clone())
            .ok_or_else(|| ApprovalError::Persistence(format!("unknown document {}", document)))
    }
}

/// A role directory backed by maps — for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    roles: HashMap<RoleId, Vec<ActorId>>,
    dynamic_rules: HashMap<String, Vec<ActorId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_role(&mut self, role: RoleId, actor: ActorId) {
        self.roles.entry(role).or_default().push(actor);
    }

    pub fn register_dynamic_rule(&mut self, rule: impl Into<String>, actors: Vec<ActorId>) {
        self.dynamic_rules.insert(rule.into(), actors);
    }
}

impl RoleDirectory for InMemoryDirectory {
    fn active_actors_with_role(&self, role: &RoleId) -> Vec<ActorId> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    fn resolve_dynamic_rule(&self, rule: &str, _context: &ResolveContext) -> Option<Vec<ActorId>> {
        self.dynamic_rules.get(rule).cloned()
    }
}

/// A sink that accepts and discards every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _event: &EngineEvent) -> Result<(), String> {
        Ok(())
    }
}

/// A sink that records every delivered event — for tests
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, event: &EngineEvent) -> Result<(), String> {
        self.events
            .lock()
            .map_err(|_| "sink poisoned".to_string())?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::InstanceId;
    use chrono::Utc;

    #[test]
    fn test_in_memory_documents() {
        let mut documents = InMemoryDocuments::new();
        documents.insert(
            DocumentRef::new("doc-1"),
            FieldSnapshot::new().with_field("total", 100i64),
            ActorId::new("author"),
        );

        let snapshot = documents.field_snapshot(&DocumentRef::new("doc-1")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            documents.initiator(&DocumentRef::new("doc-1")).unwrap(),
            ActorId::new("author")
        );

        let missing = documents.field_snapshot(&DocumentRef::new("nope"));
        assert!(matches!(missing, Err(ApprovalError::Persistence(_))));
    }

    #[test]
    fn test_in_memory_directory() {
        let mut directory = InMemoryDirectory::new();
        directory.grant_role(RoleId::new("manager"), ActorId::new("mia"));
        directory.grant_role(RoleId::new("manager"), ActorId::new("mo"));

        assert_eq!(
            directory.active_actors_with_role(&RoleId::new("manager")).len(),
            2
        );
        assert!(directory
            .active_actors_with_role(&RoleId::new("unknown"))
            .is_empty());
    }

    #[test]
    fn test_dynamic_rules() {
        let mut directory = InMemoryDirectory::new();
        directory.register_dynamic_rule("line_manager_of_initiator", vec![ActorId::new("lee")]);

        let context = ResolveContext {
            document: DocumentRef::new("doc-1"),
            initiator: ActorId::new("author"),
        };
        assert_eq!(
            directory.resolve_dynamic_rule("line_manager_of_initiator", &context),
            Some(vec![ActorId::new("lee")])
        );
        assert_eq!(directory.resolve_dynamic_rule("unknown", &context), None);
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        let event = EngineEvent::InstanceApproved {
            instance_id: InstanceId::new("inst-1"),
            document: DocumentRef::new("doc-1"),
            at: Utc::now(),
        };
        sink.deliver(&event).unwrap();
        assert_eq!(sink.events().len(), 1);
    }
}
