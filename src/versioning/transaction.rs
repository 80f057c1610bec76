//! Write transactions
//!
//! `TransactionCoordinator::execute` is the only way to write versioned
//! data:
//!
//! 1. BEGIN at serializable isolation
//! 2. Run the caller's callback with a `WriteTransaction`
//! 3. COMMIT if the callback succeeded, ROLLBACK otherwise
//!
//! A callback error is returned unchanged after rollback. A commit-time
//! serialization failure is returned as a storage error; no partial
//! effects remain and the caller may retry the whole callback.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use super::commit::Commit;
use super::errors::{VersionError, VersionResult};
use super::ids::{BranchId, CommitId};
use super::row::{generated_id, to_columns, VersionedRow, VersionedTable, ID};
use super::schema::COMMIT_TABLE;
use super::temporal::TypedQuery;
use crate::config::CommitPolicy;
use crate::observability::{Event, MetricsRegistry};
use crate::store::{IsolationLevel, Store, StoreTransaction};

/// Future returned by write-transaction callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An open serializable transaction, handed to the callback.
///
/// `C` is the commit metadata type.
pub struct WriteTransaction<T, C> {
    raw: T,
    policy: CommitPolicy,
    commit_id: Option<CommitId>,
    metrics: Arc<MetricsRegistry>,
    _metadata: PhantomData<fn(&C)>,
}

impl<T: StoreTransaction, C: Serialize + Sync> WriteTransaction<T, C> {
    fn new(raw: T, policy: CommitPolicy, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            raw,
            policy,
            commit_id: None,
            metrics,
            _metadata: PhantomData,
        }
    }

    /// Inserts a commit row and returns a handle bound to `branch_id`.
    ///
    /// The branch is not checked here; a missing branch surfaces as a
    /// foreign-key failure on the first write through the handle.
    pub async fn create_commit(
        &mut self,
        branch_id: BranchId,
        metadata: &C,
    ) -> VersionResult<Commit<'_, T>> {
        if let (CommitPolicy::Single, Some(existing)) = (self.policy, self.commit_id) {
            return Err(VersionError::CommitAlreadyCreated { existing });
        }

        let values = to_columns(COMMIT_TABLE, metadata, &[ID])?;
        let row = self.raw.insert(COMMIT_TABLE, values).await?;
        let commit_id = CommitId::new(generated_id(COMMIT_TABLE, &row)?);
        self.commit_id = Some(commit_id);

        self.metrics.increment_commits_created();
        tracing::info!(
            event = %Event::CommitCreated,
            commit_id = %commit_id,
            branch_id = %branch_id,
            "commit created"
        );
        Ok(Commit::new(branch_id, commit_id, &mut self.raw, &self.metrics))
    }

    /// The most recent commit created in this transaction.
    pub fn commit_id(&self) -> Option<CommitId> {
        self.commit_id
    }

    /// Runs a query inside this transaction, seeing its uncommitted writes.
    pub async fn fetch_all<R: VersionedTable>(
        &mut self,
        query: &TypedQuery<R>,
    ) -> VersionResult<Vec<VersionedRow<R>>> {
        fetch_all(&mut self.raw, query).await
    }

    pub async fn fetch_optional<R: VersionedTable>(
        &mut self,
        query: &TypedQuery<R>,
    ) -> VersionResult<Option<VersionedRow<R>>> {
        fetch_optional(&mut self.raw, query).await
    }
}

pub(crate) async fn fetch_all<T, R>(
    raw: &mut T,
    query: &TypedQuery<R>,
) -> VersionResult<Vec<VersionedRow<R>>>
where
    T: StoreTransaction,
    R: VersionedTable,
{
    let rows = raw.fetch_all(query.query()).await?;
    rows.into_iter().map(VersionedRow::from_row).collect()
}

pub(crate) async fn fetch_optional<T, R>(
    raw: &mut T,
    query: &TypedQuery<R>,
) -> VersionResult<Option<VersionedRow<R>>>
where
    T: StoreTransaction,
    R: VersionedTable,
{
    let query = query.first();
    let rows = raw.fetch_all(query.query()).await?;
    rows.into_iter().next().map(VersionedRow::from_row).transpose()
}

/// Runs write transactions against one store.
pub struct TransactionCoordinator<'a, S> {
    store: &'a S,
    policy: CommitPolicy,
    metrics: &'a Arc<MetricsRegistry>,
}

impl<'a, S: Store> TransactionCoordinator<'a, S> {
    pub fn new(store: &'a S, policy: CommitPolicy, metrics: &'a Arc<MetricsRegistry>) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    /// Runs `f` in a fresh serializable transaction.
    ///
    /// ```ignore
    /// coordinator
    ///     .execute(|tx| {
    ///         Box::pin(async move {
    ///             let mut commit = tx.create_commit(branch, &meta).await?;
    ///             commit.insert(&record).await?;
    ///             Ok::<_, VersionError>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute<C, F, R, E>(&self, f: F) -> Result<R, E>
    where
        C: Serialize + Send + Sync,
        F: for<'t> FnOnce(&'t mut WriteTransaction<S::Transaction, C>) -> BoxFuture<'t, Result<R, E>>
            + Send,
        R: Send,
        E: From<VersionError> + Send,
    {
        let raw = self
            .store
            .begin(IsolationLevel::Serializable)
            .await
            .map_err(|err| E::from(VersionError::from(err)))?;
        tracing::debug!(event = %Event::TxnBegin, "write transaction started");

        let mut tx = WriteTransaction::new(raw, self.policy, Arc::clone(self.metrics));
        let outcome = f(&mut tx).await;
        let WriteTransaction { raw, commit_id, .. } = tx;

        match outcome {
            Ok(value) => match raw.commit().await {
                Ok(()) => {
                    self.metrics.increment_transactions_committed();
                    tracing::info!(
                        event = %Event::TxnCommitted,
                        commit_id = ?commit_id.map(|c| c.value()),
                        "write transaction committed"
                    );
                    Ok(value)
                }
                Err(err) => {
                    self.metrics.increment_transactions_rolled_back();
                    if err.is_serialization_failure() {
                        self.metrics.increment_serialization_failures();
                        tracing::warn!(
                            event = %Event::SerializationConflict,
                            error = %err,
                            "write transaction aborted by serialization conflict"
                        );
                    } else {
                        tracing::error!(
                            event = %Event::TxnRolledBack,
                            error = %err,
                            "write transaction failed to commit"
                        );
                    }
                    Err(E::from(VersionError::from(err)))
                }
            },
            Err(err) => {
                if let Err(rollback_err) = raw.rollback().await {
                    tracing::error!(
                        event = %Event::TxnRollbackFailed,
                        error = %rollback_err,
                        "write transaction rollback failed"
                    );
                }
                self.metrics.increment_transactions_rolled_back();
                tracing::info!(event = %Event::TxnRolledBack, "write transaction rolled back");
                Err(err)
            }
        }
    }
}
