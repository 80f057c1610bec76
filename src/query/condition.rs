//! Predicate trees for row filtering
//!
//! Rows are JSON objects keyed by column name. Conditions are evaluated
//! strictly: no type coercion, exact comparison only.
//!
//! # Null handling
//!
//! - A missing column is treated as NULL
//! - NULL never satisfies a comparison (`Eq`, `Gt`, `Gte`, `Lt`, `Lte`)
//! - Only `IsNull` matches NULL

use serde_json::Value;

use crate::store::Row;

/// A predicate over a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// column = value
    Eq(String, Value),
    /// column > value
    Gt(String, Value),
    /// column >= value
    Gte(String, Value),
    /// column < value
    Lt(String, Value),
    /// column <= value
    Lte(String, Value),
    /// column IS NULL
    IsNull(String),
    /// column IS NOT NULL
    IsNotNull(String),
    /// Every child must match. An empty conjunction matches everything.
    And(Vec<Condition>),
    /// At least one child must match. An empty disjunction matches nothing.
    Or(Vec<Condition>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gt(column.into(), value.into())
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gte(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lt(column.into(), value.into())
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lte(column.into(), value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Condition::IsNotNull(column.into())
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or(children)
    }

    /// Checks whether a row satisfies this condition.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Eq(column, expected) => {
                Self::non_null(row, column).is_some_and(|actual| actual == expected)
            }
            Condition::Gt(column, bound) => Self::compare(row, column, bound, |o| o.is_gt()),
            Condition::Gte(column, bound) => Self::compare(row, column, bound, |o| o.is_ge()),
            Condition::Lt(column, bound) => Self::compare(row, column, bound, |o| o.is_lt()),
            Condition::Lte(column, bound) => Self::compare(row, column, bound, |o| o.is_le()),
            Condition::IsNull(column) => Self::non_null(row, column).is_none(),
            Condition::IsNotNull(column) => Self::non_null(row, column).is_some(),
            Condition::And(children) => children.iter().all(|c| c.matches(row)),
            Condition::Or(children) => children.iter().any(|c| c.matches(row)),
        }
    }

    /// Returns the value this condition pins `column` to, if it is a
    /// top-level equality or IS NULL test on that column.
    ///
    /// Used by the storage engine to pick index prefixes. `Some(Value::Null)`
    /// means the column is pinned to NULL.
    pub fn pinned_value(&self, column: &str) -> Option<Value> {
        match self {
            Condition::Eq(c, v) if c == column && !v.is_null() => Some(v.clone()),
            Condition::IsNull(c) if c == column => Some(Value::Null),
            Condition::And(children) => children.iter().find_map(|c| c.pinned_value(column)),
            _ => None,
        }
    }

    fn non_null<'r>(row: &'r Row, column: &str) -> Option<&'r Value> {
        row.get(column).filter(|v| !v.is_null())
    }

    fn compare(
        row: &Row,
        column: &str,
        bound: &Value,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> bool {
        let Some(actual) = Self::non_null(row, column) else {
            return false;
        };
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return accept(ai.cmp(&bi));
                }
                match (a.as_f64(), b.as_f64()) {
                    (Some(af), Some(bf)) => af.partial_cmp(&bf).is_some_and(accept),
                    _ => false,
                }
            }
            (Value::String(a), Value::String(b)) => accept(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => accept(a.cmp(b)),
            _ => false,
        }
    }
}

/// Evaluates a list of conditions with AND semantics.
pub fn matches_all(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| c.matches(row))
}
