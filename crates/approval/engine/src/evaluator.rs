//! Condition evaluator: decides whether a step applies to a document
//!
//! Evaluation is pure and total — it inspects the snapshot and returns
//! a bool, never an error. A missing field path fails the individual
//! condition, so malformed documents fail closed rather than crashing
//! the workflow.

use approval_types::{ComparisonOp, Condition, ConditionSet, FieldSnapshot, FieldValue};

/// Evaluates condition sets against a field snapshot
#[derive(Clone, Debug, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a condition set against a snapshot.
    ///
    /// Conditions sharing a group number are AND-combined; the group
    /// results are OR-combined. An empty set evaluates to `true`.
    pub fn evaluate(&self, conditions: &ConditionSet, snapshot: &FieldSnapshot) -> bool {
        if conditions.is_empty() {
            return true;
        }
        conditions.group_numbers().into_iter().any(|group| {
            conditions
                .group(group)
                .into_iter()
                .all(|condition| self.evaluate_condition(condition, snapshot))
        })
    }

    /// Evaluate an optional condition set; `None` evaluates to `false`.
    ///
    /// Used for auto-approval rules, where absence means the shortcut
    /// is not configured.
    pub fn evaluate_optional(
        &self,
        conditions: Option<&ConditionSet>,
        snapshot: &FieldSnapshot,
    ) -> bool {
        conditions
            .map(|set| self.evaluate(set, snapshot))
            .unwrap_or(false)
    }

    /// Evaluate a single condition. Missing fields fail the condition
    /// regardless of operator.
    fn evaluate_condition(&self, condition: &Condition, snapshot: &FieldSnapshot) -> bool {
        let actual = match snapshot.get(&condition.field_path) {
            Some(value) => value,
            None => return false,
        };

        match condition.op {
            ComparisonOp::Eq => self.equals(actual, &condition.value),
            ComparisonOp::Ne => !self.equals(actual, &condition.value),
            ComparisonOp::Ge | ComparisonOp::Le | ComparisonOp::Gt | ComparisonOp::Lt => {
                self.compare_numeric(condition.op, actual, &condition.value)
            }
            ComparisonOp::In => match &condition.value {
                FieldValue::List(items) => items.iter().any(|item| self.equals(actual, item)),
                _ => false,
            },
        }
    }

    /// Ordering comparison with decimal coercion of both operands.
    /// Either side failing to coerce fails the condition.
    fn compare_numeric(&self, op: ComparisonOp, left: &FieldValue, right: &FieldValue) -> bool {
        match (left.as_number(), right.as_number()) {
            (Some(left), Some(right)) => match op {
                ComparisonOp::Ge => left >= right,
                ComparisonOp::Le => left <= right,
                ComparisonOp::Gt => left > right,
                ComparisonOp::Lt => left < right,
                _ => false,
            },
            _ => false,
        }
    }

    /// Equality with numeric coercion: if both sides coerce to decimal
    /// they compare numerically, otherwise exact match.
    fn equals(&self, left: &FieldValue, right: &FieldValue) -> bool {
        if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
            return l == r;
        }
        left == right
    }
}
