//! Temporal queries
//!
//! Builders only. Nothing here touches storage; the returned queries are
//! executed through `VersionedDb`, `WriteTransaction` or `Commit`, or
//! composed further with `filter`, `order_by` and `limit`.

use std::fmt;
use std::marker::PhantomData;

use super::ids::{BranchId, CommitId, RowId};
use super::row::{VersionedTable, BRANCH_ID, ID, VALID_FROM, VALID_UNTIL};
use crate::query::{Condition, Query, SortDirection};

/// A query over the versioned table backing `T`.
pub struct TypedQuery<T> {
    query: Query,
    _table: PhantomData<fn() -> T>,
}

impl<T: VersionedTable> TypedQuery<T> {
    fn new(query: Query) -> Self {
        Self {
            query,
            _table: PhantomData,
        }
    }

    /// Adds a condition, ANDed with the temporal ones.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.query = self.query.filter(condition);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.query = self.query.order_by(column, direction);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    /// The same query capped at one row. A tighter limit is kept.
    pub(crate) fn first(&self) -> Self {
        let limit = self.query.limit_value().map_or(1, |limit| limit.min(1));
        self.clone().limit(limit)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }
}

impl<T> Clone for TypedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            _table: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedQuery").field("query", &self.query).finish()
    }
}

/// Entry point for temporal reads.
pub struct TemporalQuery;

impl TemporalQuery {
    /// Rows of `branch_id` as they were right after `commit_id`.
    ///
    /// A version closed by `commit_id` itself is excluded; the interval
    /// is half-open. Commits on other branches do not affect the result.
    pub fn select_as_of<T: VersionedTable>(
        branch_id: BranchId,
        commit_id: CommitId,
    ) -> TypedQuery<T> {
        TypedQuery::new(
            Query::select_from(T::TABLE).filter(Self::as_of_condition(branch_id, commit_id)),
        )
    }

    /// Rows of `branch_id` that no commit has superseded.
    pub fn select_latest<T: VersionedTable>(branch_id: BranchId) -> TypedQuery<T> {
        TypedQuery::new(Query::select_from(T::TABLE).filter(Self::latest_condition(branch_id)))
    }

    /// Every version of one lineage on `branch_id`, oldest first.
    pub fn select_history<T: VersionedTable>(branch_id: BranchId, row_id: &RowId) -> TypedQuery<T> {
        TypedQuery::new(
            Query::select_from(T::TABLE)
                .filter(Condition::eq(ID, row_id))
                .filter(Condition::eq(BRANCH_ID, branch_id))
                .order_by(VALID_FROM, SortDirection::Asc),
        )
    }

    /// `branch_id = b AND valid_from <= c AND (valid_until IS NULL OR valid_until > c)`
    pub fn as_of_condition(branch_id: BranchId, commit_id: CommitId) -> Condition {
        Condition::and(vec![
            Condition::eq(BRANCH_ID, branch_id),
            Condition::lte(VALID_FROM, commit_id),
            Condition::or(vec![
                Condition::is_null(VALID_UNTIL),
                Condition::gt(VALID_UNTIL, commit_id),
            ]),
        ])
    }

    /// `branch_id = b AND valid_until IS NULL`
    pub fn latest_condition(branch_id: BranchId) -> Condition {
        Condition::and(vec![
            Condition::eq(BRANCH_ID, branch_id),
            Condition::is_null(VALID_UNTIL),
        ])
    }

    /// The open version of one lineage; what update and delete close.
    pub(crate) fn open_lineage(table: &str, branch_id: BranchId, row_id: &RowId) -> Query {
        Query::select_from(table)
            .filter(Condition::eq(ID, row_id))
            .filter(Condition::eq(BRANCH_ID, branch_id))
            .filter(Condition::is_null(VALID_UNTIL))
    }
}
