//! Conditions: field comparisons that gate step applicability
//!
//! A step's `ConditionSet` is a list of comparisons against the
//! document's field snapshot. Conditions sharing a group number are
//! AND-combined; distinct groups are OR-combined, so each group is one
//! alternative way for the step to qualify. An empty set always
//! qualifies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Field Values ─────────────────────────────────────────────────────

/// A typed value carried by a document field or a condition literal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Free text
    Text(String),
    /// Decimal number — amounts, quantities, scores
    Number(Decimal),
    /// Boolean flag
    Bool(bool),
    /// A list of values, used as the right-hand side of `In`
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Coerce to a decimal for numeric comparison.
    ///
    /// Numbers convert directly; numeric text parses. Booleans and
    /// lists never coerce.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) | Self::List(_) => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for FieldValue {
    fn from(n: Decimal) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(Decimal::from(n))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        Self::List(items)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── Field Snapshot ───────────────────────────────────────────────────

/// The captured field values of a document, taken at instance start
///
/// All condition evaluation for an instance runs against this one
/// snapshot; later edits to the document do not affect a running
/// instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    fields: HashMap<String, FieldValue>,
}

impl FieldSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(path.into(), value.into());
        self
    }

    pub fn set(&mut self, path: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for FieldSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

// ── Comparison Operators ─────────────────────────────────────────────

/// The comparison operator of a single condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than or equal (numeric)
    Ge,
    /// Less than or equal (numeric)
    Le,
    /// Greater than (numeric)
    Gt,
    /// Less than (numeric)
    Lt,
    /// Membership in a list value
    In,
}

impl ComparisonOp {
    /// Whether this operator orders its operands numerically
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Ge | Self::Le | Self::Gt | Self::Lt)
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::In => "in",
        };
        write!(f, "{}", symbol)
    }
}

// ── Conditions ───────────────────────────────────────────────────────

/// One comparison against a document field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Path of the field in the snapshot
    pub field_path: String,
    /// Comparison operator
    pub op: ComparisonOp,
    /// Right-hand side literal
    pub value: FieldValue,
    /// Group number — conditions in the same group are AND-combined
    pub group: u32,
}

impl Condition {
    pub fn new(field_path: impl Into<String>, op: ComparisonOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field_path: field_path.into(),
            op,
            value: value.into(),
            group: 1,
        }
    }

    pub fn in_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field_path, self.op, self.value)
    }
}

/// An ordered list of conditions with group semantics
///
/// Empty ⇒ always satisfied. Otherwise the set is satisfied when at
/// least one group has all of its conditions satisfied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub conditions: Vec<Condition>,
}

impl ConditionSet {
    /// An empty set — always applicable
    pub fn always() -> Self {
        Self::default()
    }

    /// A set with a single condition
    pub fn single(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Distinct group numbers in first-appearance order
    pub fn group_numbers(&self) -> Vec<u32> {
        let mut groups = Vec::new();
        for condition in &self.conditions {
            if !groups.contains(&condition.group) {
                groups.push(condition.group);
            }
        }
        groups
    }

    /// Conditions belonging to one group
    pub fn group(&self, group: u32) -> Vec<&Condition> {
        self.conditions.iter().filter(|c| c.group == group).collect()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}
