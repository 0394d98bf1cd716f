//! SLA clock: flags overdue tasks without touching them
//!
//! The clock is a passive read model. It inspects open tasks and
//! reports which ones are past their deadline; it never closes a task
//! or advances an instance, so it cannot race with concurrent
//! decisions. A breached task stays decidable until it is decided,
//! superseded, or its instance is cancelled.

use crate::TaskLedger;
use approval_types::{ActorId, InstanceId, TaskId};
use chrono::{DateTime, Duration, Utc};

/// One overdue open task
#[derive(Clone, Debug)]
pub struct SlaBreach {
    /// The instance the task belongs to
    pub instance_id: InstanceId,
    /// The step within the instance
    pub step_number: u32,
    /// The overdue task
    pub task_id: TaskId,
    /// Whose decision is overdue
    pub nominee: ActorId,
    /// When the task should have been decided
    pub deadline: DateTime<Utc>,
    /// How far past the deadline it is
    pub overdue: Duration,
}

/// Passive reader that reports SLA breaches
#[derive(Clone, Debug, Default)]
pub struct SlaClock;

impl SlaClock {
    pub fn new() -> Self {
        Self
    }

    /// All open tasks past their deadline at `now`, most overdue first
    pub fn scan(&self, ledger: &TaskLedger, now: DateTime<Utc>) -> Vec<SlaBreach> {
        let mut breaches: Vec<SlaBreach> = ledger
            .tasks()
            .filter(|task| task.is_breached(now))
            .filter_map(|task| {
                task.deadline().map(|deadline| SlaBreach {
                    instance_id: task.instance_id.clone(),
                    step_number: task.step_number,
                    task_id: task.id.clone(),
                    nominee: task.nominee.clone(),
                    deadline,
                    overdue: now - deadline,
                })
            })
            .collect();
        breaches.sort_by_key(|breach| breach.deadline);
        breaches
    }
}
