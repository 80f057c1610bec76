//! Composable, unmaterialized queries
//!
//! A `Query` names a table and carries conditions, ordering and a limit.
//! It holds no connection and performs no I/O: execution is done by a
//! `Store` or `StoreTransaction`.

use super::condition::{matches_all, Condition};
use crate::store::Row;

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A single ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// A SELECT * over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<SortSpec>,
    limit: Option<usize>,
}

impl Query {
    /// Starts a query over every row of `table`.
    pub fn select_from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Adds a condition. Conditions are combined with AND.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Appends an ordering term. Earlier terms take precedence.
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(SortSpec {
            column: column.into(),
            direction,
        });
        self
    }

    /// Caps the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order(&self) -> &[SortSpec] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Returns true if the row satisfies every condition.
    pub fn matches(&self, row: &Row) -> bool {
        matches_all(row, &self.conditions)
    }

    /// Returns the value pinned for `column` by any top-level condition.
    pub fn pinned_value(&self, column: &str) -> Option<serde_json::Value> {
        self.conditions
            .iter()
            .find_map(|c| c.pinned_value(column))
    }
}
