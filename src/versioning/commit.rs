//! Commit handle
//!
//! Every write made through a `Commit` is stamped with the commit's id.
//!
//! # Lineage rules
//!
//! - insert opens a new lineage: fresh `id`, `valid_from = commit`
//! - update closes the open version (`valid_until = commit`) and opens a
//!   successor carrying the merged columns
//! - delete closes the open version and opens nothing
//! - update and delete require exactly one open version of the lineage on
//!   the bound branch; anything else is an invariant violation
//!
//! Rows are never physically removed.
//!
//! A version opened by this same commit is rewritten in place on update,
//! since no commit could ever observe it. Deleting such a version leaves
//! the empty interval `[commit, commit)`, which no temporal query returns.

use serde::Serialize;
use serde_json::Value;

use super::errors::{VersionError, VersionResult};
use super::ids::{BranchId, CommitId, RowId};
use super::row::{
    caller_columns, to_columns, VersionedRow, VersionedTable, BRANCH_ID, ID, SYSTEM_COLUMNS,
    VALID_FROM, VALID_UNTIL,
};
use super::temporal::{TemporalQuery, TypedQuery};
use super::transaction::{fetch_all, fetch_optional};
use crate::observability::{Event, MetricsRegistry};
use crate::query::Query;
use crate::store::{Row, StoreTransaction};

/// A commit bound to one branch inside an open write transaction.
pub struct Commit<'t, T> {
    branch_id: BranchId,
    commit_id: CommitId,
    raw: &'t mut T,
    metrics: &'t MetricsRegistry,
}

impl<'t, T: StoreTransaction> Commit<'t, T> {
    pub(crate) fn new(
        branch_id: BranchId,
        commit_id: CommitId,
        raw: &'t mut T,
        metrics: &'t MetricsRegistry,
    ) -> Self {
        Self {
            branch_id,
            commit_id,
            raw,
            metrics,
        }
    }

    pub fn id(&self) -> CommitId {
        self.commit_id
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    /// Opens a new lineage and returns its id.
    pub async fn insert<R: VersionedTable>(&mut self, record: &R) -> VersionResult<RowId> {
        let mut values = to_columns(R::TABLE, record, &SYSTEM_COLUMNS)?;
        let row_id = RowId::generate();
        values.insert(ID.to_string(), Value::from(&row_id));
        values.insert(BRANCH_ID.to_string(), self.branch_id.into());
        values.insert(VALID_FROM.to_string(), self.commit_id.into());
        values.insert(VALID_UNTIL.to_string(), Value::Null);

        self.raw.insert(R::TABLE, values).await?;

        self.metrics.increment_rows_inserted();
        tracing::debug!(
            event = %Event::RowInserted,
            table = R::TABLE,
            row_id = %row_id,
            branch_id = %self.branch_id,
            commit_id = %self.commit_id,
            "row inserted"
        );
        Ok(row_id)
    }

    /// Supersedes the open version of `row_id` with one carrying `changes`.
    ///
    /// `changes` is any serializable object holding a subset of `R`'s
    /// columns; omitted columns keep their current values. The merged row
    /// must still decode as `R`.
    pub async fn update<R, P>(&mut self, row_id: &RowId, changes: &P) -> VersionResult<()>
    where
        R: VersionedTable,
        P: Serialize + Sync + ?Sized,
    {
        let table = R::TABLE;
        let changes = to_columns(table, changes, &SYSTEM_COLUMNS)?;
        let lineage = TemporalQuery::open_lineage(table, self.branch_id, row_id);

        let mut open = self.raw.fetch_all(&lineage).await?;
        if open.len() != 1 {
            return Err(self.violation(table, row_id, open.len()));
        }
        let mut next = open.remove(0);
        for (column, value) in &changes {
            next.insert(column.clone(), value.clone());
        }
        serde_json::from_value::<R>(Value::Object(caller_columns(next.clone())))?;

        let opened_here = next.get(VALID_FROM).and_then(Value::as_i64) == Some(self.commit_id.value());
        if opened_here {
            let rewritten = self.raw.update(&lineage, changes).await?;
            self.expect_one_open(table, row_id, rewritten.len())?;
        } else {
            self.close(&lineage, table, row_id).await?;
            next.insert(VALID_FROM.to_string(), self.commit_id.into());
            next.insert(VALID_UNTIL.to_string(), Value::Null);
            self.raw.insert(table, next).await?;
        }

        self.metrics.increment_rows_updated();
        tracing::debug!(
            event = %Event::RowUpdated,
            table,
            row_id = %row_id,
            branch_id = %self.branch_id,
            commit_id = %self.commit_id,
            in_place = opened_here,
            "row updated"
        );
        Ok(())
    }

    /// Closes the open version of `row_id`. History is kept.
    pub async fn delete<R: VersionedTable>(&mut self, row_id: &RowId) -> VersionResult<()> {
        let table = R::TABLE;
        let lineage = TemporalQuery::open_lineage(table, self.branch_id, row_id);
        self.close(&lineage, table, row_id).await?;

        self.metrics.increment_rows_deleted();
        tracing::debug!(
            event = %Event::RowDeleted,
            table,
            row_id = %row_id,
            branch_id = %self.branch_id,
            commit_id = %self.commit_id,
            "row deleted"
        );
        Ok(())
    }

    /// Runs a query inside the enclosing transaction, seeing its writes.
    pub async fn fetch_all<R: VersionedTable>(
        &mut self,
        query: &TypedQuery<R>,
    ) -> VersionResult<Vec<VersionedRow<R>>> {
        fetch_all(&mut *self.raw, query).await
    }

    pub async fn fetch_optional<R: VersionedTable>(
        &mut self,
        query: &TypedQuery<R>,
    ) -> VersionResult<Option<VersionedRow<R>>> {
        fetch_optional(&mut *self.raw, query).await
    }

    async fn close(&mut self, lineage: &Query, table: &str, row_id: &RowId) -> VersionResult<()> {
        let mut changes = Row::new();
        changes.insert(VALID_UNTIL.to_string(), self.commit_id.into());
        let closed = self.raw.update(lineage, changes).await?;
        self.expect_one_open(table, row_id, closed.len())
    }

    fn expect_one_open(&self, table: &str, row_id: &RowId, open_rows: usize) -> VersionResult<()> {
        if open_rows == 1 {
            return Ok(());
        }
        Err(self.violation(table, row_id, open_rows))
    }

    fn violation(&self, table: &str, row_id: &RowId, open_rows: usize) -> VersionError {
        self.metrics.increment_invariant_violations();
        tracing::error!(
            event = %Event::InvariantViolation,
            table,
            row_id = %row_id,
            branch_id = %self.branch_id,
            commit_id = %self.commit_id,
            open_rows,
            "expected exactly one open version"
        );
        VersionError::InvariantViolation {
            table: table.to_string(),
            row_id: row_id.clone(),
            branch_id: self.branch_id,
            open_rows,
        }
    }
}
