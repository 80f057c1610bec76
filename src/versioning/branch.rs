//! Branch registry
//!
//! Branches are rows of the `branch` table; their id comes from the
//! table's generated column. Creation runs in its own short transaction
//! and is durable once it returns.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::errors::VersionResult;
use super::ids::BranchId;
use super::row::{generated_id, to_columns, Branch, ID};
use super::schema::BRANCH_TABLE;
use crate::observability::{Event, MetricsRegistry};
use crate::query::{Condition, Query};
use crate::store::{IsolationLevel, Row, Store, StoreTransaction};

pub struct BranchRegistry<'a, S> {
    store: &'a S,
    metrics: &'a MetricsRegistry,
}

impl<'a, S: Store> BranchRegistry<'a, S> {
    pub fn new(store: &'a S, metrics: &'a MetricsRegistry) -> Self {
        Self { store, metrics }
    }

    /// Inserts a branch row and returns its new id.
    ///
    /// Metadata columns must exist on the `branch` table; `id` is
    /// rejected. Foreign-key and NOT NULL failures come back as
    /// storage errors and leave no row behind.
    pub async fn create_branch<B>(&self, metadata: &B) -> VersionResult<BranchId>
    where
        B: Serialize + Sync + ?Sized,
    {
        let values = to_columns(BRANCH_TABLE, metadata, &[ID])?;

        let mut tx = self.store.begin(IsolationLevel::Serializable).await?;
        let inserted = tx.insert(BRANCH_TABLE, values).await;
        let row = match inserted {
            Ok(row) => row,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        event = %Event::TxnRollbackFailed,
                        error = %rollback_err,
                        "branch insert rollback failed"
                    );
                }
                return Err(err.into());
            }
        };
        tx.commit().await?;

        let branch_id = BranchId::new(generated_id(BRANCH_TABLE, &row)?);
        self.metrics.increment_branches_created();
        tracing::info!(event = %Event::BranchCreated, branch_id = %branch_id, "branch created");
        Ok(branch_id)
    }

    /// Returns the branch with its metadata, or `None` if no such branch
    /// has been committed.
    pub async fn get_branch_metadata<B>(&self, branch_id: BranchId) -> VersionResult<Option<Branch<B>>>
    where
        B: DeserializeOwned,
    {
        match metadata_row(self.store, BRANCH_TABLE, branch_id.value()).await? {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }
}

/// Looks up a row of a metadata table by generated id.
pub(crate) async fn metadata_row<S: Store>(
    store: &S,
    table: &str,
    id: i64,
) -> VersionResult<Option<Row>> {
    let query = Query::select_from(table).filter(Condition::eq(ID, id)).limit(1);
    let rows = store.fetch_all(&query).await?;
    Ok(rows.into_iter().next())
}
