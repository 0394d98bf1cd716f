//! Task ledger: creates, tracks, and closes approval tasks
//!
//! The ledger is the single writer of task state. A task's open→closed
//! transition happens exactly once — whichever close lands first wins
//! and every later attempt surfaces `AlreadyDecided`. That rule is what
//! makes racing decisions on sibling tasks safe.

use approval_types::{
    ActorId, ApprovalError, ApprovalResult, ApprovalTask, DecisionOutcome, InstanceId, TaskId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Guards applied when an actor decides a task
#[derive(Clone, Copy, Debug)]
pub struct DecisionContext<'a> {
    /// The instance's initiator, for the self-approval check
    pub initiator: &'a ActorId,
    /// Whether the step permits the initiator to decide
    pub allow_self_approval: bool,
    /// Decision timestamp
    pub now: DateTime<Utc>,
}

/// The ledger of approval tasks across all instances
#[derive(Clone, Debug, Default)]
pub struct TaskLedger {
    tasks: HashMap<TaskId, ApprovalTask>,
    by_instance: HashMap<InstanceId, Vec<TaskId>>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one task per nominee for a step. Returns the task IDs in
    /// nominee order.
    pub fn open(
        &mut self,
        instance_id: &InstanceId,
        step_number: u32,
        nominees: &[ActorId],
        sla_hours: u32,
        now: DateTime<Utc>,
    ) -> Vec<TaskId> {
        let mut opened = Vec::with_capacity(nominees.len());
        for nominee in nominees {
            let task = ApprovalTask::open(
                instance_id.clone(),
                step_number,
                nominee.clone(),
                sla_hours,
                now,
            );
            let id = task.id.clone();
            self.by_instance
                .entry(instance_id.clone())
                .or_default()
                .push(id.clone());
            self.tasks.insert(id.clone(), task);
            opened.push(id);
        }
        opened
    }

    /// Decide a task.
    ///
    /// Guard order: the task must exist and be open (`AlreadyDecided`
    /// otherwise), the actor must not be the initiator on a step that
    /// forbids self-approval (`SelfApprovalForbidden`), and the actor
    /// must be the task's nominee (`NotEligible`). Rejections require a
    /// non-blank reason.
    pub fn decide(
        &mut self,
        task_id: &TaskId,
        outcome: DecisionOutcome,
        actor: &ActorId,
        reason: Option<String>,
        context: &DecisionContext<'_>,
    ) -> ApprovalResult<()> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ApprovalError::TaskNotFound(task_id.clone()))?;

        if !task.is_open() {
            return Err(ApprovalError::AlreadyDecided(task_id.clone()));
        }
        if actor == context.initiator && !context.allow_self_approval {
            return Err(ApprovalError::SelfApprovalForbidden(actor.clone()));
        }
        if *actor != task.nominee {
            return Err(ApprovalError::NotEligible(actor.clone()));
        }

        match outcome {
            DecisionOutcome::Approve => task.approve(actor.clone(), reason, context.now),
            DecisionOutcome::Reject => {
                let reason = reason.ok_or_else(|| {
                    ApprovalError::Validation("a reason is required to reject".into())
                })?;
                task.reject(actor.clone(), reason, context.now)
            }
        }
    }

    /// Close the surviving open tasks of one step as superseded.
    /// Returns the IDs that were closed.
    pub fn supersede_open_for_step(
        &mut self,
        instance_id: &InstanceId,
        step_number: u32,
        now: DateTime<Utc>,
    ) -> Vec<TaskId> {
        self.supersede_where(instance_id, now, |task| task.step_number == step_number)
    }

    /// Close every open task of an instance as superseded (rejection or
    /// cancellation). Returns the IDs that were closed.
    pub fn supersede_open(&mut self, instance_id: &InstanceId, now: DateTime<Utc>) -> Vec<TaskId> {
        self.supersede_where(instance_id, now, |_| true)
    }

    fn supersede_where(
        &mut self,
        instance_id: &InstanceId,
        now: DateTime<Utc>,
        matches: impl Fn(&ApprovalTask) -> bool,
    ) -> Vec<TaskId> {
        let ids = self.by_instance.get(instance_id).cloned().unwrap_or_default();
        let mut closed = Vec::new();
        for id in ids {
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.is_open() && matches(task) && task.supersede(now).is_ok() {
                    closed.push(id);
                }
            }
        }
        closed
    }

    /// Explicitly expire an open task past its deadline.
    ///
    /// The engine never does this on its own — SLA breach is
    /// observability — but the surrounding layer may close a stale task
    /// deliberately.
    pub fn expire(&mut self, task_id: &TaskId, now: DateTime<Utc>) -> ApprovalResult<()> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ApprovalError::TaskNotFound(task_id.clone()))?;
        if !task.is_open() {
            return Err(ApprovalError::AlreadyDecided(task_id.clone()));
        }
        if !task.is_breached(now) {
            return Err(ApprovalError::Validation(format!(
                "task {} is not past its deadline",
                task_id
            )));
        }
        task.expire(now)
    }

    // ── Query methods ────────────────────────────────────────────────

    /// Get a task by ID
    pub fn task(&self, id: &TaskId) -> ApprovalResult<&ApprovalTask> {
        self.tasks
            .get(id)
            .ok_or_else(|| ApprovalError::TaskNotFound(id.clone()))
    }

    /// All tasks (any status) opened for one step of an instance
    pub fn tasks_for_step(&self, instance_id: &InstanceId, step_number: u32) -> Vec<&ApprovalTask> {
        self.tasks_for_instance(instance_id)
            .into_iter()
            .filter(|task| task.step_number == step_number)
            .collect()
    }

    /// All tasks (any status) of an instance, in open order
    pub fn tasks_for_instance(&self, instance_id: &InstanceId) -> Vec<&ApprovalTask> {
        self.by_instance
            .get(instance_id)
            .map(|ids| ids.iter().filter_map(|id| self.tasks.get(id)).collect())
            .unwrap_or_default()
    }

    /// Open tasks of an instance
    pub fn open_tasks_for_instance(&self, instance_id: &InstanceId) -> Vec<&ApprovalTask> {
        self.tasks_for_instance(instance_id)
            .into_iter()
            .filter(|task| task.is_open())
            .collect()
    }

    /// Open tasks awaiting one actor, across all instances
    pub fn open_tasks_for_actor(&self, actor: &ActorId) -> Vec<&ApprovalTask> {
        let mut tasks: Vec<&ApprovalTask> = self
            .tasks
            .values()
            .filter(|task| task.is_open() && task.nominee == *actor)
            .collect();
        tasks.sort_by_key(|task| task.dispatched_at);
        tasks
    }

    /// Iterate over every task in the ledger
    pub fn tasks(&self) -> impl Iterator<Item = &ApprovalTask> {
        self.tasks.values()
    }

    pub fn count(&self) -> usize {
        self.tasks.len()
    }
}
