//! Versioned database facade
//!
//! Ties a store, the configuration and one metrics registry together and
//! exposes the branch registry, temporal reads and write transactions.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::branch::{metadata_row, BranchRegistry};
use super::errors::{VersionError, VersionResult};
use super::ids::{BranchId, CommitId};
use super::row::{Branch, CommitInfo, VersionedRow, VersionedTable};
use super::schema::COMMIT_TABLE;
use super::temporal::TypedQuery;
use super::transaction::{BoxFuture, TransactionCoordinator, WriteTransaction};
use crate::config::{ConfigResult, VersioningConfig};
use crate::observability::{MetricsRegistry, MetricsSnapshot};
use crate::store::{MemoryStore, Store};

/// A store with Git-like branches and commits.
///
/// `B` is the branch metadata type, `C` the commit metadata type. Both
/// serialize to objects whose keys are columns of the `branch` and
/// `commit` tables.
pub struct VersionedDb<S, B, C> {
    store: S,
    config: VersioningConfig,
    metrics: Arc<MetricsRegistry>,
    _metadata: PhantomData<fn() -> (B, C)>,
}

impl<B, C> VersionedDb<MemoryStore, B, C>
where
    B: Serialize + DeserializeOwned + Send + Sync,
    C: Serialize + DeserializeOwned + Send + Sync,
{
    /// Opens a fresh in-memory database. Install a schema before use.
    pub fn in_memory(config: VersioningConfig) -> ConfigResult<Self> {
        config.validate()?;
        let store = MemoryStore::with_config(config.store.clone());
        Ok(Self::with_config(store, config))
    }
}

impl<S, B, C> VersionedDb<S, B, C>
where
    S: Store,
    B: Serialize + DeserializeOwned + Send + Sync,
    C: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, VersioningConfig::default())
    }

    pub fn with_config(store: S, config: VersioningConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(MetricsRegistry::new()),
            _metadata: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &VersioningConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn branches(&self) -> BranchRegistry<'_, S> {
        BranchRegistry::new(&self.store, &self.metrics)
    }

    pub async fn create_branch(&self, metadata: &B) -> VersionResult<BranchId> {
        self.branches().create_branch(metadata).await
    }

    pub async fn get_branch_metadata(&self, branch_id: BranchId) -> VersionResult<Option<Branch<B>>> {
        self.branches().get_branch_metadata(branch_id).await
    }

    /// Returns a committed commit with its metadata.
    pub async fn get_commit_metadata(
        &self,
        commit_id: CommitId,
    ) -> VersionResult<Option<CommitInfo<C>>> {
        match metadata_row(&self.store, COMMIT_TABLE, commit_id.value()).await? {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }

    /// Runs a query against the latest committed state.
    pub async fn fetch_all<T: VersionedTable>(
        &self,
        query: &TypedQuery<T>,
    ) -> VersionResult<Vec<VersionedRow<T>>> {
        let rows = self.store.fetch_all(query.query()).await?;
        rows.into_iter().map(VersionedRow::from_row).collect()
    }

    pub async fn fetch_optional<T: VersionedTable>(
        &self,
        query: &TypedQuery<T>,
    ) -> VersionResult<Option<VersionedRow<T>>> {
        let query = query.first();
        let rows = self.store.fetch_all(query.query()).await?;
        rows.into_iter().next().map(VersionedRow::from_row).transpose()
    }

    /// Runs `f` in a serializable transaction. See
    /// [`TransactionCoordinator::execute`].
    pub async fn execute_write_transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: for<'t> FnOnce(&'t mut WriteTransaction<S::Transaction, C>) -> BoxFuture<'t, Result<R, E>>
            + Send,
        R: Send,
        E: From<VersionError> + Send,
    {
        TransactionCoordinator::new(&self.store, self.config.commit_policy, &self.metrics)
            .execute(f)
            .await
    }
}
