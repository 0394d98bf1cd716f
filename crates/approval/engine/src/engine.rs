//! Approval engine: the state machine driving instances step by step
//!
//! The engine coordinates, it never decides. It snapshots the document,
//! asks the evaluator whether each step applies, asks the resolver who
//! must decide, opens tasks through the ledger, and applies the quorum
//! policy when decisions arrive. All external I/O goes through the
//! injected collaborators; notification failures never roll back a
//! transition.

use crate::{
    ApproverResolver, ConditionEvaluator, DecisionContext, DefinitionStore, DocumentProvider,
    NotificationSink, ResolveContext, RoleDirectory, SlaBreach, SlaClock, TaskLedger,
};
use approval_types::{
    ActorId, ApprovalError, ApprovalResult, ApprovalTask, DecisionOutcome, DefinitionId,
    DocumentRef, EngineEvent, InstanceId, QuorumPolicy, TaskId, TaskStatus, WorkflowDefinition,
    WorkflowInstance,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// The approval workflow engine
pub struct ApprovalEngine {
    /// Versioned definition store
    definitions: DefinitionStore,
    /// Running and finished instances
    instances: HashMap<InstanceId, WorkflowInstance>,
    /// All approval tasks
    ledger: TaskLedger,
    /// Pure condition evaluation
    evaluator: ConditionEvaluator,
    /// Approver rule expansion
    resolver: ApproverResolver,
    /// Owner of the target documents
    documents: Arc<dyn DocumentProvider>,
    /// Role/actor directory
    directory: Arc<dyn RoleDirectory>,
    /// Fire-and-forget event delivery
    notifier: Arc<dyn NotificationSink>,
}

impl ApprovalEngine {
    pub fn new(
        documents: Arc<dyn DocumentProvider>,
        directory: Arc<dyn RoleDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            definitions: DefinitionStore::new(),
            instances: HashMap::new(),
            ledger: TaskLedger::new(),
            evaluator: ConditionEvaluator::new(),
            resolver: ApproverResolver::new(),
            documents,
            directory,
            notifier,
        }
    }

    // ── Definition Management ────────────────────────────────────────

    /// Publish a definition as the next version of its process
    pub fn publish_definition(
        &mut self,
        definition: WorkflowDefinition,
    ) -> ApprovalResult<DefinitionId> {
        self.definitions.publish(definition)
    }

    /// Get a definition version
    pub fn definition(&self, id: &DefinitionId) -> ApprovalResult<&WorkflowDefinition> {
        self.definitions.get(id)
    }

    /// The versioned definition store
    pub fn definition_store(&self) -> &DefinitionStore {
        &self.definitions
    }

    /// Retire a definition version
    pub fn deactivate_definition(&mut self, id: &DefinitionId) -> ApprovalResult<()> {
        self.definitions.deactivate(id)
    }

    // ── Instance Lifecycle ───────────────────────────────────────────

    /// Start an instance of a definition against a document.
    ///
    /// Snapshots the document's fields, then advances: inapplicable
    /// steps are skipped, auto-approval rules are honored, and the
    /// first step requiring human judgment opens its tasks. Fails with
    /// `InstanceAlreadyActive` when the document already has a pending
    /// instance, and with `NoEligibleApprover` when a dispatching step
    /// resolves to nobody — in which case nothing is recorded.
    pub fn start(
        &mut self,
        definition_id: &DefinitionId,
        document: DocumentRef,
        initiator: ActorId,
    ) -> ApprovalResult<InstanceId> {
        let definition = self.definitions.get(definition_id)?;
        if !definition.is_active {
            return Err(ApprovalError::DefinitionInactive(definition_id.clone()));
        }
        if self
            .instances
            .values()
            .any(|instance| instance.document == document && instance.is_pending())
        {
            return Err(ApprovalError::InstanceAlreadyActive(document));
        }

        let snapshot = self.documents.field_snapshot(&document)?;
        let mut instance =
            WorkflowInstance::new(definition_id.clone(), document, initiator, snapshot);
        let instance_id = instance.id.clone();

        self.advance_or_dispatch(&mut instance)?;

        tracing::info!(
            instance = %instance_id,
            definition = %definition_id,
            "workflow instance started"
        );
        self.instances.insert(instance_id.clone(), instance);
        Ok(instance_id)
    }

    /// Start an instance, reading the initiator from the document
    /// provider
    pub fn start_for_document(
        &mut self,
        definition_id: &DefinitionId,
        document: DocumentRef,
    ) -> ApprovalResult<InstanceId> {
        let initiator = self.documents.initiator(&document)?;
        self.start(definition_id, document, initiator)
    }

    /// Decide an open task.
    ///
    /// A rejection terminates the instance immediately; an approval
    /// re-checks the step's quorum and, when satisfied, advances to the
    /// next applicable step or finalizes the instance.
    pub fn decide(
        &mut self,
        task_id: &TaskId,
        outcome: DecisionOutcome,
        actor: &ActorId,
        reason: Option<String>,
    ) -> ApprovalResult<()> {
        let task = self.ledger.task(task_id)?.clone();
        if task.status.is_closed() {
            return Err(ApprovalError::AlreadyDecided(task_id.clone()));
        }

        let mut instance = self
            .instances
            .remove(&task.instance_id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(task.instance_id.clone()))?;

        let result = self.decide_inner(&mut instance, &task, outcome, actor, reason);
        self.instances.insert(instance.id.clone(), instance);
        result
    }

    fn decide_inner(
        &mut self,
        instance: &mut WorkflowInstance,
        task: &ApprovalTask,
        outcome: DecisionOutcome,
        actor: &ActorId,
        reason: Option<String>,
    ) -> ApprovalResult<()> {
        if !instance.is_pending() {
            return Err(ApprovalError::InvalidTransition(format!(
                "instance {} is {:?}",
                instance.id, instance.status
            )));
        }

        let definition = self.definitions.get(&instance.definition_id)?.clone();
        let step = definition.step(task.step_number).ok_or_else(|| {
            ApprovalError::Validation(format!(
                "definition {} has no step {}",
                definition.id, task.step_number
            ))
        })?;

        let now = Utc::now();
        let context = DecisionContext {
            initiator: &instance.initiator,
            allow_self_approval: step.allow_self_approval,
            now,
        };
        self.ledger
            .decide(&task.id, outcome, actor, reason.clone(), &context)?;

        instance.record_decision(step.step_number, actor.clone(), outcome, reason.as_deref());
        self.emit(EngineEvent::TaskDecided {
            instance_id: instance.id.clone(),
            task_id: task.id.clone(),
            step_number: step.step_number,
            actor: actor.clone(),
            outcome,
            at: now,
        });

        match outcome {
            DecisionOutcome::Reject => {
                self.ledger.supersede_open(&instance.id, now);
                let reason = reason.as_deref().unwrap_or("rejected");
                instance.reject(actor.clone(), reason);
                self.emit(EngineEvent::InstanceRejected {
                    instance_id: instance.id.clone(),
                    document: instance.document.clone(),
                    at: now,
                });
                tracing::info!(instance = %instance.id, "workflow instance rejected");
                Ok(())
            }
            DecisionOutcome::Approve => {
                let satisfied = match step.quorum {
                    QuorumPolicy::AnyOne => {
                        // First approval wins; open siblings are closed
                        // without counting as decisions
                        self.ledger
                            .supersede_open_for_step(&instance.id, step.step_number, now);
                        true
                    }
                    QuorumPolicy::All => self
                        .ledger
                        .tasks_for_step(&instance.id, step.step_number)
                        .iter()
                        .all(|sibling| sibling.status == TaskStatus::Approved),
                };

                if satisfied {
                    instance.record_step_satisfied(step.step_number);
                    instance.advance_step();
                    self.advance_or_dispatch(instance)?;
                }
                Ok(())
            }
        }
    }

    /// Cancel a pending instance. Open tasks are superseded; the
    /// instance is final.
    pub fn cancel(
        &mut self,
        instance_id: &InstanceId,
        actor: &ActorId,
        reason: &str,
    ) -> ApprovalResult<()> {
        let mut instance = self
            .instances
            .remove(instance_id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(instance_id.clone()))?;

        let result = self.cancel_inner(&mut instance, actor, reason);
        self.instances.insert(instance.id.clone(), instance);
        result
    }

    fn cancel_inner(
        &mut self,
        instance: &mut WorkflowInstance,
        actor: &ActorId,
        reason: &str,
    ) -> ApprovalResult<()> {
        if !instance.is_pending() {
            return Err(ApprovalError::InvalidTransition(format!(
                "instance {} is {:?}",
                instance.id, instance.status
            )));
        }
        let now = Utc::now();
        self.ledger.supersede_open(&instance.id, now);
        instance.cancel(actor.clone(), reason);
        self.emit(EngineEvent::InstanceCancelled {
            instance_id: instance.id.clone(),
            document: instance.document.clone(),
            at: now,
        });
        tracing::info!(instance = %instance.id, "workflow instance cancelled");
        Ok(())
    }

    /// Re-run the advance routine for a pending instance.
    ///
    /// Idempotent: with no new decisions this changes nothing. Useful
    /// to retry dispatch after a `NoEligibleApprover` escalation has
    /// been resolved in the directory.
    pub fn redispatch(&mut self, instance_id: &InstanceId) -> ApprovalResult<()> {
        let mut instance = self
            .instances
            .remove(instance_id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(instance_id.clone()))?;

        let result = self.advance_or_dispatch(&mut instance);
        self.instances.insert(instance.id.clone(), instance);
        result
    }

    // ── State machine core ───────────────────────────────────────────

    /// Walk the step chain from the instance's cursor: finalize past
    /// the last step, honor auto-approval, skip inapplicable steps, and
    /// dispatch the first step that needs human judgment.
    ///
    /// Re-entrant: a step that already has tasks is left untouched.
    fn advance_or_dispatch(&mut self, instance: &mut WorkflowInstance) -> ApprovalResult<()> {
        let definition = self.definitions.get(&instance.definition_id)?.clone();
        let last_step = definition.last_step_number();

        loop {
            if !instance.is_pending() {
                return Ok(());
            }

            if instance.current_step > last_step {
                instance.approve();
                self.emit(EngineEvent::InstanceApproved {
                    instance_id: instance.id.clone(),
                    document: instance.document.clone(),
                    at: Utc::now(),
                });
                tracing::info!(instance = %instance.id, "workflow instance approved");
                return Ok(());
            }

            let step = definition.step(instance.current_step).ok_or_else(|| {
                ApprovalError::Validation(format!(
                    "definition {} has no step {}",
                    definition.id, instance.current_step
                ))
            })?;

            if self
                .evaluator
                .evaluate_optional(step.auto_approval.as_ref(), &instance.snapshot)
            {
                tracing::debug!(instance = %instance.id, step = step.step_number, "step auto-approved");
                instance.record_auto_approved(step.step_number);
                instance.advance_step();
                continue;
            }

            if !self.evaluator.evaluate(&step.conditions, &instance.snapshot) {
                tracing::debug!(instance = %instance.id, step = step.step_number, "step skipped");
                instance.record_skipped(step.step_number);
                instance.advance_step();
                continue;
            }

            if !self
                .ledger
                .tasks_for_step(&instance.id, step.step_number)
                .is_empty()
            {
                // Already dispatched; a repeated advance is a no-op
                return Ok(());
            }

            let context = ResolveContext {
                document: instance.document.clone(),
                initiator: instance.initiator.clone(),
            };
            let nominees = self
                .resolver
                .resolve(step, &context, self.directory.as_ref())?;

            let now = Utc::now();
            let opened = self.ledger.open(
                &instance.id,
                step.step_number,
                &nominees,
                step.sla_hours,
                now,
            );
            instance.record_dispatched(step.step_number, opened.len());
            tracing::debug!(
                instance = %instance.id,
                step = step.step_number,
                tasks = opened.len(),
                "step dispatched"
            );
            for (task_id, nominee) in opened.iter().zip(&nominees) {
                self.emit(EngineEvent::TaskOpened {
                    instance_id: instance.id.clone(),
                    task_id: task_id.clone(),
                    step_number: step.step_number,
                    nominee: nominee.clone(),
                    at: now,
                });
            }
            return Ok(());
        }
    }

    // ── Query ────────────────────────────────────────────────────────

    /// Get an instance by ID
    pub fn instance(&self, id: &InstanceId) -> ApprovalResult<&WorkflowInstance> {
        self.instances
            .get(id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(id.clone()))
    }

    /// The most recent instance for a document, if any
    pub fn instance_for_document(&self, document: &DocumentRef) -> Option<&WorkflowInstance> {
        self.instances
            .values()
            .filter(|instance| instance.document == *document)
            .max_by_key(|instance| instance.created_at)
    }

    /// All pending instances
    pub fn active_instances(&self) -> Vec<&WorkflowInstance> {
        self.instances
            .values()
            .filter(|instance| instance.is_pending())
            .collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Get a task by ID
    pub fn task(&self, id: &TaskId) -> ApprovalResult<&ApprovalTask> {
        self.ledger.task(id)
    }

    /// All tasks opened for one step of an instance
    pub fn tasks_for_step(&self, instance_id: &InstanceId, step_number: u32) -> Vec<&ApprovalTask> {
        self.ledger.tasks_for_step(instance_id, step_number)
    }

    /// Open tasks awaiting one actor, across all instances
    pub fn open_tasks_for(&self, actor: &ActorId) -> Vec<&ApprovalTask> {
        self.ledger.open_tasks_for_actor(actor)
    }

    /// The task ledger (read-only)
    pub fn ledger(&self) -> &TaskLedger {
        &self.ledger
    }

    /// SLA breaches among open tasks at `now`
    pub fn sla_breaches(&self, now: DateTime<Utc>) -> Vec<SlaBreach> {
        SlaClock::new().scan(&self.ledger, now)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Deliver an event; failures are logged, never propagated
    fn emit(&self, event: EngineEvent) {
        if let Err(error) = self.notifier.deliver(&event) {
            tracing::warn!(%event, %error, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryDirectory, InMemoryDocuments, MemorySink};
    use approval_types::{
        ApproverRule, ComparisonOp as Op, Condition, ConditionSet, FieldSnapshot, HistoryEvent,
        InstanceStatus, QuorumPolicy, RoleId, Step,
    };
    use chrono::Duration;

    fn engine_with(
        documents: InMemoryDocuments,
        directory: InMemoryDirectory,
    ) -> (ApprovalEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = ApprovalEngine::new(Arc::new(documents), Arc::new(directory), sink.clone());
        (engine, sink)
    }

    fn po_documents(total: i64) -> InMemoryDocuments {
        let mut documents = InMemoryDocuments::new();
        documents.insert(
            DocumentRef::new("po-1"),
            FieldSnapshot::new().with_field("total", total),
            ActorId::new("dana"),
        );
        documents
    }

    fn role_directory() -> InMemoryDirectory {
        let mut directory = InMemoryDirectory::new();
        directory.grant_role(RoleId::new("supervisor"), ActorId::new("sam"));
        directory.grant_role(RoleId::new("manager"), ActorId::new("mia"));
        directory.grant_role(RoleId::new("manager"), ActorId::new("mo"));
        directory
    }

    fn publish(engine: &mut ApprovalEngine, definition: WorkflowDefinition) -> DefinitionId {
        engine.publish_definition(definition).unwrap()
    }

    fn start_po(engine: &mut ApprovalEngine, definition_id: &DefinitionId) -> InstanceId {
        engine
            .start(definition_id, DocumentRef::new("po-1"), ActorId::new("dana"))
            .unwrap()
    }

    fn approve_as(engine: &mut ApprovalEngine, actor: &str) {
        let task_id = engine.open_tasks_for(&ActorId::new(actor))[0].id.clone();
        engine
            .decide(&task_id, DecisionOutcome::Approve, &ActorId::new(actor), None)
            .unwrap();
    }

    // ── Scenarios from the process design ────────────────────────────

    #[test]
    fn test_always_on_step() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        let open = engine.open_tasks_for(&ActorId::new("sam"));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].step_number, 1);

        approve_as(&mut engine, "sam");
        let instance = engine.instance(&instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Approved);
        assert!(instance.closed_at.is_some());
    }

    #[test]
    fn test_conditional_skip() {
        // Supervisor always; Manager only when total >= 10,000,000.
        // A 5,000,000 order never reaches the manager.
        let (mut engine, _) = engine_with(po_documents(5_000_000), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor")))
                .with_step(
                    Step::new(2, "Manager", ApproverRule::role("manager")).with_conditions(
                        ConditionSet::single(Condition::new("total", Op::Ge, 10_000_000i64)),
                    ),
                ),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "sam");

        let instance = engine.instance(&instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Approved);
        assert_eq!(instance.dispatched_steps(), vec![1]);
        assert_eq!(instance.skipped_steps(), vec![2]);
        // Skip correctness: no task was ever created for the manager step
        assert!(engine.tasks_for_step(&instance_id, 2).is_empty());
    }

    #[test]
    fn test_manager_step_dispatches_above_threshold() {
        let (mut engine, _) = engine_with(po_documents(12_000_000), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor")))
                .with_step(
                    Step::new(2, "Manager", ApproverRule::role("manager")).with_conditions(
                        ConditionSet::single(Condition::new("total", Op::Ge, 10_000_000i64)),
                    ),
                ),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "sam");

        let instance = engine.instance(&instance_id).unwrap();
        assert!(instance.is_pending());
        assert_eq!(instance.current_step, 2);
        assert_eq!(engine.tasks_for_step(&instance_id, 2).len(), 2);
    }

    #[test]
    fn test_or_grouped_condition() {
        // High value (group 1) OR high risk (group 2): a low-value,
        // high-risk claim still qualifies for the step.
        let mut documents = InMemoryDocuments::new();
        documents.insert(
            DocumentRef::new("claim-1"),
            FieldSnapshot::new()
                .with_field("claim_amount", 10_000_000i64)
                .with_field("is_high_risk", true),
            ActorId::new("dana"),
        );
        let (mut engine, _) = engine_with(documents, role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("Claim Review", "claim").with_step(
                Step::new(1, "Risk Review", ApproverRule::role("supervisor")).with_conditions(
                    ConditionSet::always()
                        .with(Condition::new("claim_amount", Op::Ge, 50_000_000i64).in_group(1))
                        .with(Condition::new("is_high_risk", Op::Eq, true).in_group(2)),
                ),
            ),
        );

        let instance_id = engine
            .start(&definition_id, DocumentRef::new("claim-1"), ActorId::new("dana"))
            .unwrap();
        let instance = engine.instance(&instance_id).unwrap();
        assert!(instance.is_pending());
        assert_eq!(instance.dispatched_steps(), vec![1]);
    }

    #[test]
    fn test_rejection_short_circuit() {
        // Two-step workflow; first step needs ALL of two nominees.
        // One approves, the other rejects: the instance fails at once,
        // and the earlier approval stays in the record.
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(
                    Step::new(
                        1,
                        "Dual Control",
                        ApproverRule::Users(vec![ActorId::new("ana"), ActorId::new("ben")]),
                    )
                    .with_quorum(QuorumPolicy::All),
                )
                .with_step(Step::new(2, "Manager", ApproverRule::role("manager"))),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "ana");
        assert!(engine.instance(&instance_id).unwrap().is_pending());

        let ben_task = engine.open_tasks_for(&ActorId::new("ben"))[0].id.clone();
        engine
            .decide(
                &ben_task,
                DecisionOutcome::Reject,
                &ActorId::new("ben"),
                Some("supplier not vetted".into()),
            )
            .unwrap();

        let instance = engine.instance(&instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Rejected);
        // Step 2 never dispatched
        assert!(engine.tasks_for_step(&instance_id, 2).is_empty());
        // Ana's approval is retained, not unwound
        let approvals: Vec<_> = instance
            .history
            .iter()
            .filter(|entry| {
                matches!(
                    entry.event,
                    HistoryEvent::TaskDecided {
                        outcome: DecisionOutcome::Approve,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(approvals.len(), 1);
        let ana_task = &engine.tasks_for_step(&instance_id, 1)[0];
        assert_eq!(ana_task.status, TaskStatus::Approved);
    }

    // ── Quorum ───────────────────────────────────────────────────────

    #[test]
    fn test_any_one_supersedes_siblings() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Manager", ApproverRule::role("manager"))),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        assert_eq!(engine.tasks_for_step(&instance_id, 1).len(), 2);

        let mo_task = engine.open_tasks_for(&ActorId::new("mo"))[0].id.clone();
        approve_as(&mut engine, "mia");

        let instance = engine.instance(&instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Approved);
        assert_eq!(
            engine.task(&mo_task).unwrap().status,
            TaskStatus::Superseded
        );

        // The losing sibling's late decision is a distinguishable no-op
        let late = engine.decide(&mo_task, DecisionOutcome::Approve, &ActorId::new("mo"), None);
        assert!(matches!(late, Err(ApprovalError::AlreadyDecided(_))));
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );
    }

    #[test]
    fn test_all_quorum_requires_every_task() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(
                Step::new(1, "Manager", ApproverRule::role("manager"))
                    .with_quorum(QuorumPolicy::All),
            ),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "mia");

        // One of two approvals: still pending
        let instance = engine.instance(&instance_id).unwrap();
        assert!(instance.is_pending());
        assert_eq!(engine.open_tasks_for(&ActorId::new("mo")).len(), 1);

        approve_as(&mut engine, "mo");
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );
    }

    // ── Decision guards ──────────────────────────────────────────────

    #[test]
    fn test_self_approval_forbidden() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(Step::new(
                1,
                "Peer Review",
                ApproverRule::Users(vec![ActorId::new("dana"), ActorId::new("sam")]),
            )),
        );

        let instance_id = start_po(&mut engine, &definition_id);

        // dana initiated the document; her decision on her own task fails
        let dana_task = engine.open_tasks_for(&ActorId::new("dana"))[0].id.clone();
        let result = engine.decide(
            &dana_task,
            DecisionOutcome::Approve,
            &ActorId::new("dana"),
            None,
        );
        assert!(matches!(result, Err(ApprovalError::SelfApprovalForbidden(_))));
        assert!(engine.instance(&instance_id).unwrap().is_pending());

        // The other nominee is unaffected
        approve_as(&mut engine, "sam");
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );
    }

    #[test]
    fn test_self_approval_allowed_when_configured() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(
                Step::new(1, "Self Service", ApproverRule::user("dana")).with_self_approval(),
            ),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "dana");
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );
    }

    #[test]
    fn test_not_eligible_actor() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );
        let instance_id = start_po(&mut engine, &definition_id);

        let task_id = engine.open_tasks_for(&ActorId::new("sam"))[0].id.clone();
        let result = engine.decide(
            &task_id,
            DecisionOutcome::Approve,
            &ActorId::new("mia"),
            None,
        );
        assert!(matches!(result, Err(ApprovalError::NotEligible(_))));
        assert!(engine.instance(&instance_id).unwrap().is_pending());
    }

    #[test]
    fn test_rejection_requires_reason() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );
        let instance_id = start_po(&mut engine, &definition_id);

        let task_id = engine.open_tasks_for(&ActorId::new("sam"))[0].id.clone();
        let result = engine.decide(&task_id, DecisionOutcome::Reject, &ActorId::new("sam"), None);
        assert!(matches!(result, Err(ApprovalError::Validation(_))));

        // Nothing moved
        assert!(engine.instance(&instance_id).unwrap().is_pending());
        assert!(engine.task(&task_id).unwrap().is_open());
    }

    #[test]
    fn test_no_double_decision() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );
        let instance_id = start_po(&mut engine, &definition_id);

        let task_id = engine.open_tasks_for(&ActorId::new("sam"))[0].id.clone();
        approve_as(&mut engine, "sam");

        let history_before = engine.instance(&instance_id).unwrap().history_count();
        let again = engine.decide(&task_id, DecisionOutcome::Approve, &ActorId::new("sam"), None);
        assert!(matches!(again, Err(ApprovalError::AlreadyDecided(_))));
        // The failed attempt altered nothing
        assert_eq!(
            engine.instance(&instance_id).unwrap().history_count(),
            history_before
        );
    }

    #[test]
    fn test_decide_unknown_task() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let result = engine.decide(
            &TaskId::new("nope"),
            DecisionOutcome::Approve,
            &ActorId::new("sam"),
            None,
        );
        assert!(matches!(result, Err(ApprovalError::TaskNotFound(_))));
    }

    // ── Start guards ─────────────────────────────────────────────────

    #[test]
    fn test_instance_already_active() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        let second = engine.start(
            &definition_id,
            DocumentRef::new("po-1"),
            ActorId::new("dana"),
        );
        assert!(matches!(second, Err(ApprovalError::InstanceAlreadyActive(_))));

        // Once the first instance is closed a new one may start
        engine
            .cancel(&instance_id, &ActorId::new("dana"), "resubmitting")
            .unwrap();
        assert!(start_po(&mut engine, &definition_id) != instance_id);
    }

    #[test]
    fn test_no_eligible_approver_fails_start() {
        let (mut engine, _) = engine_with(po_documents(100), InMemoryDirectory::new());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );

        let result = engine.start(
            &definition_id,
            DocumentRef::new("po-1"),
            ActorId::new("dana"),
        );
        assert!(matches!(
            result,
            Err(ApprovalError::NoEligibleApprover { step: 1 })
        ));
        // Nothing was recorded
        assert_eq!(engine.instance_count(), 0);
        assert!(engine.instance_for_document(&DocumentRef::new("po-1")).is_none());
    }

    #[test]
    fn test_start_unknown_definition() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let result = engine.start(
            &DefinitionId::new("nope"),
            DocumentRef::new("po-1"),
            ActorId::new("dana"),
        );
        assert!(matches!(result, Err(ApprovalError::DefinitionNotFound(_))));
    }

    #[test]
    fn test_start_for_document_reads_initiator() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );

        let instance_id = engine
            .start_for_document(&definition_id, DocumentRef::new("po-1"))
            .unwrap();
        assert_eq!(
            engine.instance(&instance_id).unwrap().initiator,
            ActorId::new("dana")
        );
    }

    // ── Versioning ───────────────────────────────────────────────────

    #[test]
    fn test_running_instance_keeps_its_version() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let v1 = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );
        let instance_id = start_po(&mut engine, &v1);

        // A second version adds a manager step
        let v2 = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor")))
                .with_step(Step::new(2, "Manager", ApproverRule::role("manager"))),
        );
        assert_eq!(engine.definition(&v2).unwrap().version, 2);

        // The running instance still follows the single-step v1
        approve_as(&mut engine, "sam");
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );

        // New instances cannot start from the retired version
        let stale = engine.start(&v1, DocumentRef::new("po-2"), ActorId::new("dana"));
        assert!(matches!(stale, Err(ApprovalError::DefinitionInactive(_))));
    }

    // ── Auto-approval ────────────────────────────────────────────────

    #[test]
    fn test_auto_approval_skips_dispatch() {
        let (mut engine, _) = engine_with(po_documents(250_000), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(
                    Step::new(1, "Clerk", ApproverRule::role("clerk")).with_auto_approval(
                        ConditionSet::single(Condition::new("total", Op::Lt, 1_000_000i64)),
                    ),
                )
                .with_step(Step::new(2, "Supervisor", ApproverRule::role("supervisor"))),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        let instance = engine.instance(&instance_id).unwrap();

        // Step 1 satisfied without a single task; step 2 dispatched
        assert!(engine.tasks_for_step(&instance_id, 1).is_empty());
        assert_eq!(engine.tasks_for_step(&instance_id, 2).len(), 1);
        assert!(instance
            .history
            .iter()
            .any(|entry| matches!(entry.event, HistoryEvent::StepAutoApproved { step_number: 1 })));
    }

    // ── Idempotency ──────────────────────────────────────────────────

    #[test]
    fn test_redispatch_is_idempotent() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(
                Step::new(1, "Manager", ApproverRule::role("manager"))
                    .with_quorum(QuorumPolicy::All),
            ),
        );
        let instance_id = start_po(&mut engine, &definition_id);

        let tasks_before = engine.tasks_for_step(&instance_id, 1).len();
        let history_before = engine.instance(&instance_id).unwrap().history_count();

        engine.redispatch(&instance_id).unwrap();
        engine.redispatch(&instance_id).unwrap();

        assert_eq!(engine.tasks_for_step(&instance_id, 1).len(), tasks_before);
        assert_eq!(
            engine.instance(&instance_id).unwrap().history_count(),
            history_before
        );
        assert_eq!(engine.instance(&instance_id).unwrap().current_step, 1);
    }

    // ── Cancellation ─────────────────────────────────────────────────

    #[test]
    fn test_cancel_supersedes_open_tasks() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(
                Step::new(1, "Manager", ApproverRule::role("manager"))
                    .with_quorum(QuorumPolicy::All),
            ),
        );
        let instance_id = start_po(&mut engine, &definition_id);

        engine
            .cancel(&instance_id, &ActorId::new("dana"), "document withdrawn")
            .unwrap();

        let instance = engine.instance(&instance_id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Cancelled);
        for task in engine.tasks_for_step(&instance_id, 1) {
            assert_eq!(task.status, TaskStatus::Superseded);
        }

        // Terminal means terminal
        let again = engine.cancel(&instance_id, &ActorId::new("dana"), "again");
        assert!(matches!(again, Err(ApprovalError::InvalidTransition(_))));
    }

    // ── Dynamic rules ────────────────────────────────────────────────

    #[test]
    fn test_dynamic_approver_rule() {
        let mut directory = role_directory();
        directory.register_dynamic_rule(
            "line_manager_of_initiator",
            vec![ActorId::new("lee")],
        );
        let (mut engine, _) = engine_with(po_documents(100), directory);
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(Step::new(
                1,
                "Line Manager",
                ApproverRule::dynamic("line_manager_of_initiator"),
            )),
        );

        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "lee");
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );
    }

    // ── Events ───────────────────────────────────────────────────────

    #[test]
    fn test_events_are_emitted_in_order() {
        let (mut engine, sink) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order")
                .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor"))),
        );
        let instance_id = start_po(&mut engine, &definition_id);
        approve_as(&mut engine, "sam");

        let kinds: Vec<String> = sink
            .events()
            .iter()
            .map(|event| format!("{}", event).split(':').next().unwrap_or("").to_string())
            .collect();
        assert_eq!(kinds, vec!["task_opened", "task_decided", "instance_approved"]);
        for event in sink.events() {
            assert_eq!(event.instance_id(), &instance_id);
        }
    }

    // ── SLA ──────────────────────────────────────────────────────────

    #[test]
    fn test_sla_breach_is_reported_not_enforced() {
        let (mut engine, _) = engine_with(po_documents(100), role_directory());
        let definition_id = publish(
            &mut engine,
            WorkflowDefinition::new("PO Approval", "purchase_order").with_step(
                Step::new(1, "Supervisor", ApproverRule::role("supervisor")).with_sla_hours(24),
            ),
        );
        let instance_id = start_po(&mut engine, &definition_id);

        let dispatched = engine.tasks_for_step(&instance_id, 1)[0].dispatched_at;
        assert!(engine.sla_breaches(dispatched + Duration::hours(12)).is_empty());

        let breaches = engine.sla_breaches(dispatched + Duration::hours(30));
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].instance_id, instance_id);
        assert_eq!(breaches[0].step_number, 1);

        // Breach did not close anything: the task is still decidable
        approve_as(&mut engine, "sam");
        assert_eq!(
            engine.instance(&instance_id).unwrap().status,
            InstanceStatus::Approved
        );
    }

    // ── Determinism ──────────────────────────────────────────────────

    #[test]
    fn test_replay_is_deterministic() {
        fn run() -> Vec<HistoryEvent> {
            let (mut engine, _) = engine_with(po_documents(12_000_000), role_directory());
            let definition_id = publish(
                &mut engine,
                WorkflowDefinition::new("PO Approval", "purchase_order")
                    .with_step(Step::new(1, "Supervisor", ApproverRule::role("supervisor")))
                    .with_step(
                        Step::new(2, "Manager", ApproverRule::role("manager"))
                            .with_quorum(QuorumPolicy::All)
                            .with_conditions(ConditionSet::single(Condition::new(
                                "total",
                                Op::Ge,
                                10_000_000i64,
                            ))),
                    ),
            );
            let instance_id = start_po(&mut engine, &definition_id);
            approve_as(&mut engine, "sam");
            approve_as(&mut engine, "mia");
            approve_as(&mut engine, "mo");
            engine
                .instance(&instance_id)
                .unwrap()
                .history
                .iter()
                .map(|entry| entry.event.clone())
                .collect()
        }

        assert_eq!(run(), run());
    }
}

