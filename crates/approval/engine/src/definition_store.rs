//! Definition store: append-only, versioned workflow definitions
//!
//! Publishing never mutates an existing version. A new publication of
//! the same process (name + target entity kind) gets the next version
//! number and retires the previously active version; old versions are
//! retained for the instances already bound to them.

use approval_types::{ApprovalError, ApprovalResult, DefinitionId, WorkflowDefinition};
use std::collections::HashMap;

/// Process key: (name, target entity kind)
type ProcessKey = (String, String);

/// Versioned registry of workflow definitions
#[derive(Clone, Debug, Default)]
pub struct DefinitionStore {
    /// Every published version, keyed by ID
    definitions: HashMap<DefinitionId, WorkflowDefinition>,
    /// Version IDs per process, in publication order
    by_process: HashMap<ProcessKey, Vec<DefinitionId>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a definition as the next version of its process.
    ///
    /// Validates the draft, assigns the version number, marks it active
    /// and retires the previously active version. Returns the new
    /// version's ID.
    pub fn publish(&mut self, mut definition: WorkflowDefinition) -> ApprovalResult<DefinitionId> {
        definition.validate()?;

        let key: ProcessKey = (
            definition.name.clone(),
            definition.target_entity_kind.clone(),
        );

        let prior_ids: Vec<DefinitionId> = self.by_process.get(&key).cloned().unwrap_or_default();
        let next_version = prior_ids
            .last()
            .and_then(|id| self.definitions.get(id))
            .map(|prior| prior.version + 1)
            .unwrap_or(1);

        for id in &prior_ids {
            if let Some(prior) = self.definitions.get_mut(id) {
                prior.is_active = false;
            }
        }

        definition.version = next_version;
        definition.is_active = true;

        let id = definition.id.clone();
        self.definitions.insert(id.clone(), definition);
        self.by_process.entry(key).or_default().push(id.clone());

        tracing::info!(definition = %id, version = next_version, "workflow definition published");
        Ok(id)
    }

    /// Get a definition version by ID
    pub fn get(&self, id: &DefinitionId) -> ApprovalResult<&WorkflowDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| ApprovalError::DefinitionNotFound(id.clone()))
    }

    /// The currently active version of a process, if any
    pub fn latest_active(&self, name: &str, target_entity_kind: &str) -> Option<&WorkflowDefinition> {
        self.by_process
            .get(&(name.to_string(), target_entity_kind.to_string()))
            .and_then(|ids| ids.last())
            .and_then(|id| self.definitions.get(id))
            .filter(|definition| definition.is_active)
    }

    /// All versions of a process in publication order
    pub fn versions(&self, name: &str, target_entity_kind: &str) -> Vec<&WorkflowDefinition> {
        self.by_process
            .get(&(name.to_string(), target_entity_kind.to_string()))
            .map(|ids| ids.iter().filter_map(|id| self.definitions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Retire a version so no new instances can start from it.
    ///
    /// Instances already bound to it keep running.
    pub fn deactivate(&mut self, id: &DefinitionId) -> ApprovalResult<()> {
        let definition = self
            .definitions
            .get_mut(id)
            .ok_or_else(|| ApprovalError::DefinitionNotFound(id.clone()))?;
        definition.is_active = false;
        tracing::info!(definition = %id, "workflow definition deactivated");
        Ok(())
    }

    /// All published versions across all processes
    pub fn list(&self) -> Vec<&WorkflowDefinition> {
        self.definitions.values().collect()
    }

    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    pub fn contains(&self, id: &DefinitionId) -> bool {
        self.definitions.contains_key(id)
    }
}
