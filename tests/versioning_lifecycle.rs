//! Versioning Lifecycle Tests
//!
//! End-to-end behavior through VersionedDb:
//! - Branch and commit metadata
//! - Insert / update / delete lineage rules
//! - At most one open version per lineage per branch
//! - Point-in-time reads after a sequence of commits

use std::sync::Arc;

use branchline::store::{ColumnDef, ColumnType, MemoryStore, MemoryTransaction, Store};
use branchline::versioning::{CommitInfo, VALID_FROM, VALID_UNTIL};
use branchline::{
    Branch, BranchId, CommitId, CommitPolicy, Condition, ConfigError, Query, RowId, SortDirection, StorageError,
    TemporalQuery, VersionError, VersionedDb, VersionedRow, VersionedSchema, VersionedTable,
    VersioningConfig, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BranchMeta {
    name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CommitMeta {
    author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Variable {
    name: String,
}

impl VersionedTable for Variable {
    const TABLE: &'static str = "variable";
}

type Db = VersionedDb<MemoryStore, BranchMeta, CommitMeta>;
type Tx = WriteTransaction<MemoryTransaction, CommitMeta>;

fn schema() -> VersionedSchema {
    VersionedSchema::new()
        .branch_metadata(ColumnDef::new("name", ColumnType::Text).not_null())
        .commit_metadata(ColumnDef::new("author", ColumnType::Text).not_null())
        .versioned::<Variable>(vec![ColumnDef::new("name", ColumnType::Text).not_null()])
}

async fn setup_with(config: VersioningConfig) -> Db {
    let db = Db::in_memory(config).unwrap();
    schema().install(db.store()).await.unwrap();
    db
}

async fn setup() -> Db {
    setup_with(VersioningConfig::default()).await
}

fn alice() -> CommitMeta {
    CommitMeta {
        author: "Alice".into(),
    }
}

fn variable(name: &str) -> Variable {
    Variable { name: name.into() }
}

async fn insert(db: &Db, branch: BranchId, names: &[&str]) -> (CommitId, Vec<RowId>) {
    let records: Vec<Variable> = names.iter().map(|n| variable(n)).collect();
    db.execute_write_transaction(move |tx: &mut Tx| {
        Box::pin(async move {
            let mut commit = tx.create_commit(branch, &alice()).await?;
            let mut ids = Vec::with_capacity(records.len());
            for record in &records {
                ids.push(commit.insert(record).await?);
            }
            Ok::<_, VersionError>((commit.id(), ids))
        })
    })
    .await
    .unwrap()
}

async fn rename(db: &Db, branch: BranchId, id: &RowId, name: &str) -> CommitId {
    let id = id.clone();
    let name = name.to_string();
    db.execute_write_transaction(move |tx: &mut Tx| {
        Box::pin(async move {
            let mut commit = tx.create_commit(branch, &alice()).await?;
            commit
                .update::<Variable, _>(&id, &json!({ "name": name }))
                .await?;
            Ok::<_, VersionError>(commit.id())
        })
    })
    .await
    .unwrap()
}

async fn delete(db: &Db, branch: BranchId, id: &RowId) -> CommitId {
    let id = id.clone();
    db.execute_write_transaction(move |tx: &mut Tx| {
        Box::pin(async move {
            let mut commit = tx.create_commit(branch, &alice()).await?;
            commit.delete::<Variable>(&id).await?;
            Ok::<_, VersionError>(commit.id())
        })
    })
    .await
    .unwrap()
}

async fn as_of(db: &Db, branch: BranchId, commit: CommitId) -> Vec<VersionedRow<Variable>> {
    let query =
        TemporalQuery::select_as_of::<Variable>(branch, commit).order_by("name", SortDirection::Asc);
    db.fetch_all(&query).await.unwrap()
}

async fn latest(db: &Db, branch: BranchId) -> Vec<VersionedRow<Variable>> {
    let query = TemporalQuery::select_latest::<Variable>(branch).order_by("name", SortDirection::Asc);
    db.fetch_all(&query).await.unwrap()
}

async fn open_versions(db: &Db, branch: BranchId, id: &RowId) -> usize {
    let query = Query::select_from(Variable::TABLE)
        .filter(Condition::eq("id", id))
        .filter(Condition::eq("branch_id", branch))
        .filter(Condition::is_null(VALID_UNTIL));
    db.store().fetch_all(&query).await.unwrap().len()
}

// =============================================================================
// Branch Registry
// =============================================================================

#[tokio::test]
async fn test_create_branch_returns_stored_id() {
    let db = setup().await;

    let id = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let branch = db.get_branch_metadata(id).await.unwrap().unwrap();
    assert_eq!(
        branch,
        Branch {
            id,
            metadata: BranchMeta { name: "main".into() }
        }
    );
    assert_eq!(db.metrics().branches_created, 1);
}

#[tokio::test]
async fn test_unknown_branch_metadata_is_absent() {
    let db = setup().await;
    assert!(db.get_branch_metadata(BranchId::new(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_commit_metadata_is_saved() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let (commit, _) = insert(&db, main, &[]).await;

    let info: CommitInfo<CommitMeta> = db.get_commit_metadata(commit).await.unwrap().unwrap();
    assert_eq!(info.id, commit);
    assert_eq!(info.metadata.author, "Alice");
}

// =============================================================================
// Commit Operations
// =============================================================================

/// Insert then latest returns exactly the inserted fields, open, stamped
/// with the inserting commit.
#[tokio::test]
async fn test_insert_round_trip() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let (commit, ids) = insert(&db, main, &["Insulin resistance"]).await;

    let rows = latest(&db, main).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, ids[0]);
    assert_eq!(rows[0].fields, variable("Insulin resistance"));
    assert_eq!(rows[0].branch_id, main);
    assert_eq!(rows[0].valid_from, commit);
    assert_eq!(rows[0].valid_until, None);
}

/// Update closes the prior version and opens a merged successor.
#[tokio::test]
async fn test_update_closes_and_replaces() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (first, ids) = insert(&db, main, &["Insulin resistance"]).await;

    let second = rename(&db, main, &ids[0], "Insulin sensitivity").await;
    assert!(second > first);

    let history = db
        .fetch_all(&TemporalQuery::select_history::<Variable>(main, &ids[0]))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);

    assert_eq!(history[0].fields.name, "Insulin resistance");
    assert_eq!(history[0].valid_from, first);
    assert_eq!(history[0].valid_until, Some(second));

    assert_eq!(history[1].id, ids[0]);
    assert_eq!(history[1].fields.name, "Insulin sensitivity");
    assert_eq!(history[1].valid_from, second);
    assert_eq!(history[1].valid_until, None);
}

/// Delete closes the open version and opens nothing.
#[tokio::test]
async fn test_delete_closes_without_successor() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (first, ids) = insert(&db, main, &["Insulin resistance"]).await;

    let second = delete(&db, main, &ids[0]).await;

    let history = db
        .fetch_all(&TemporalQuery::select_history::<Variable>(main, &ids[0]))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].valid_from, first);
    assert_eq!(history[0].valid_until, Some(second));
    assert!(latest(&db, main).await.is_empty());
}

/// A deleted lineage cannot be updated or deleted again.
#[tokio::test]
async fn test_deleted_lineage_rejects_further_writes() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (_, ids) = insert(&db, main, &["gone"]).await;
    delete(&db, main, &ids[0]).await;

    let id = ids[0].clone();
    let err = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(main, &alice()).await?;
                commit.delete::<Variable>(&id).await?;
                Ok::<_, VersionError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, VersionError::InvariantViolation { open_rows: 0, .. }));
    assert!(err.is_fatal());
    assert_eq!(db.metrics().invariant_violations, 1);
    assert_eq!(db.metrics().transactions_rolled_back, 1);
}

/// Inserting and deleting in one commit leaves only the empty `[c, c)`
/// version, which no point-in-time read returns.
#[tokio::test]
async fn test_insert_then_delete_in_one_commit() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let (commit, id) = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(main, &alice()).await?;
                let id = commit.insert(&variable("fleeting")).await?;
                commit.delete::<Variable>(&id).await?;
                Ok::<_, VersionError>((commit.id(), id))
            })
        })
        .await
        .unwrap();

    assert!(as_of(&db, main, commit).await.is_empty());
    assert!(latest(&db, main).await.is_empty());
    assert_eq!(open_versions(&db, main, &id).await, 0);

    let history = db
        .fetch_all(&TemporalQuery::select_history::<Variable>(main, &id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].valid_from, commit);
    assert_eq!(history[0].valid_until, Some(commit));

    let later = db.execute_write_transaction({
        let id = id.clone();
        move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(main, &alice()).await?;
                commit
                    .update::<Variable, _>(&id, &json!({ "name": "revived" }))
                    .await
            })
        }
    });
    let err = later.await.unwrap_err();
    assert!(matches!(err, VersionError::InvariantViolation { open_rows: 0, .. }));

    let err = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(main, &alice()).await?;
                commit.delete::<Variable>(&id).await
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VersionError::InvariantViolation { open_rows: 0, .. }));
}

/// Writing through a commit bound to a missing branch fails on the
/// foreign key and leaves nothing behind.
#[tokio::test]
async fn test_commit_on_unknown_branch_fails_on_write() {
    let db = setup().await;
    let missing = BranchId::new(99);

    let err = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(missing, &alice()).await?;
                commit.insert(&variable("orphan")).await?;
                Ok::<_, VersionError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VersionError::Storage(StorageError::ForeignKeyViolation { .. })
    ));
    let commits = db.store().fetch_all(&Query::select_from("commit")).await.unwrap();
    assert!(commits.is_empty());
}

#[tokio::test]
async fn test_insert_rejects_system_columns() {
    #[derive(Serialize, Deserialize)]
    struct Sneaky {
        name: String,
        valid_from: i64,
    }
    impl VersionedTable for Sneaky {
        const TABLE: &'static str = "variable";
    }

    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let err = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(main, &alice()).await?;
                commit
                    .insert(&Sneaky {
                        name: "x".into(),
                        valid_from: 1,
                    })
                    .await?;
                Ok::<_, VersionError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VersionError::ReservedColumn { ref column, .. } if column == VALID_FROM
    ));
}

// =============================================================================
// Lineage Invariant
// =============================================================================

/// After any mix of updates and deletes, each lineage has at most one
/// open version per branch.
#[tokio::test]
async fn test_at_most_one_open_version_per_lineage() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (_, ids) = insert(&db, main, &["a", "b", "c"]).await;

    for round in 0..5 {
        rename(&db, main, &ids[0], &format!("a{round}")).await;
        rename(&db, main, &ids[1], &format!("b{round}")).await;
    }
    delete(&db, main, &ids[2]).await;

    assert_eq!(open_versions(&db, main, &ids[0]).await, 1);
    assert_eq!(open_versions(&db, main, &ids[1]).await, 1);
    assert_eq!(open_versions(&db, main, &ids[2]).await, 0);

    let history = db
        .fetch_all(&TemporalQuery::select_history::<Variable>(main, &ids[0]))
        .await
        .unwrap();
    assert_eq!(history.len(), 6);
    for pair in history.windows(2) {
        assert_eq!(pair[0].valid_until, Some(pair[1].valid_from));
        assert!(pair[0].valid_from < pair[1].valid_from);
    }
}

/// Every version of a lineage is visible at exactly the commits inside
/// its window.
#[tokio::test]
async fn test_one_version_visible_per_commit() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (first, ids) = insert(&db, main, &["v0"]).await;
    let mut last = first;
    for i in 1..4 {
        last = rename(&db, main, &ids[0], &format!("v{i}")).await;
    }

    for c in first.value()..=last.value() {
        let rows = as_of(&db, main, CommitId::new(c)).await;
        assert_eq!(rows.len(), 1, "commit {c}");
        assert!(rows[0].is_valid_at(CommitId::new(c)));
    }
}

// =============================================================================
// Scenarios
// =============================================================================

/// main: commit 1 inserts A, commit 2 updates A.
#[tokio::test]
async fn test_scenario_update_preserves_history() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let (c1, ids) = insert(&db, main, &["Obesity"]).await;
    let rows = as_of(&db, main, c1).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, ids[0]);

    let c2 = rename(&db, main, &ids[0], "Diabetes").await;

    let at_c1 = as_of(&db, main, c1).await;
    assert_eq!(at_c1.len(), 1);
    assert_eq!(at_c1[0].id, ids[0]);
    assert_eq!(at_c1[0].fields.name, "Obesity");

    let at_c2 = as_of(&db, main, c2).await;
    assert_eq!(at_c2.len(), 1);
    assert_eq!(at_c2[0].id, ids[0]);
    assert_eq!(at_c2[0].fields.name, "Diabetes");

    assert_eq!(latest(&db, main).await, at_c2);
}

/// Commit 1 inserts A and B, commit 2 deletes A.
#[tokio::test]
async fn test_scenario_delete_preserves_history() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let (c1, ids) = insert(&db, main, &["A", "B"]).await;
    let c2 = delete(&db, main, &ids[0]).await;

    let at_c1: Vec<_> = as_of(&db, main, c1).await.into_iter().map(|r| r.id).collect();
    assert_eq!(at_c1, ids);

    let at_c2: Vec<_> = as_of(&db, main, c2).await.into_iter().map(|r| r.id).collect();
    assert_eq!(at_c2, [ids[1].clone()]);

    let head: Vec<_> = latest(&db, main).await.into_iter().map(|r| r.id).collect();
    assert_eq!(head, [ids[1].clone()]);
}

/// Writes on one branch never show up on another, at any commit.
#[tokio::test]
async fn test_branches_are_isolated() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let draft = db.create_branch(&BranchMeta { name: "draft".into() }).await.unwrap();

    let (c1, _) = insert(&db, main, &["main only"]).await;
    let (c2, _) = insert(&db, draft, &["draft only"]).await;

    assert!(as_of(&db, draft, c1).await.is_empty());
    assert_eq!(as_of(&db, main, c2).await[0].fields.name, "main only");
    assert_eq!(latest(&db, draft).await.len(), 1);
    assert_eq!(latest(&db, draft).await[0].fields.name, "draft only");
}

// =============================================================================
// Commit Policy
// =============================================================================

#[tokio::test]
async fn test_default_policy_allows_one_commit_per_transaction() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let err = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                tx.create_commit(main, &alice()).await?;
                tx.create_commit(main, &alice()).await?;
                Ok::<_, VersionError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, VersionError::CommitAlreadyCreated { .. }));
    assert!(db.store().fetch_all(&Query::select_from("commit")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_multiple_policy_stamps_each_commit() {
    let db = setup_with(VersioningConfig::default().with_commit_policy(CommitPolicy::Multiple)).await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (c0, ids) = insert(&db, main, &["v0"]).await;

    let id = ids[0].clone();
    let (c1, c2) = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let c1 = {
                    let mut commit = tx.create_commit(main, &alice()).await?;
                    commit.update::<Variable, _>(&id, &json!({"name": "v1"})).await?;
                    commit.id()
                };
                let mut commit = tx.create_commit(main, &alice()).await?;
                commit.update::<Variable, _>(&id, &json!({"name": "v2"})).await?;
                Ok::<_, VersionError>((c1, commit.id()))
            })
        })
        .await
        .unwrap();

    assert!(c0 < c1 && c1 < c2);
    assert_eq!(as_of(&db, main, c1).await[0].fields.name, "v1");
    assert_eq!(as_of(&db, main, c2).await[0].fields.name, "v2");
}

// =============================================================================
// Transaction Boundary
// =============================================================================

#[tokio::test]
async fn test_returns_callback_value() {
    let db = setup().await;
    let value = db
        .execute_write_transaction(|_tx: &mut Tx| Box::pin(async { Ok::<_, VersionError>(42) }))
        .await
        .unwrap();
    assert_eq!(value, 42);
}

/// A failed callback leaves neither the commit nor its rows behind.
#[tokio::test]
async fn test_failed_callback_is_atomic() {
    let db = setup().await;
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();
    let (_, ids) = insert(&db, main, &["kept"]).await;

    let id = ids[0].clone();
    let err = db
        .execute_write_transaction(move |tx: &mut Tx| {
            Box::pin(async move {
                let mut commit = tx.create_commit(main, &alice()).await?;
                commit.update::<Variable, _>(&id, &json!({"name": "lost"})).await?;
                commit.insert(&variable("also lost")).await?;
                commit.delete::<Variable>(&RowId::generate()).await?;
                Ok::<_, VersionError>(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VersionError::InvariantViolation { .. }));

    let rows = latest(&db, main).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields.name, "kept");
    assert_eq!(open_versions(&db, main, &ids[0]).await, 1);
    assert_eq!(
        db.store().fetch_all(&Query::select_from("commit")).await.unwrap().len(),
        1
    );
}

#[test]
fn test_in_memory_rejects_invalid_config() {
    let mut config = VersioningConfig::default();
    config.store.conflict_log_limit = 0;
    let err = Db::in_memory(config).err().unwrap();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

/// A shared handle can be written from a spawned task.
#[tokio::test]
async fn test_db_is_shareable_across_tasks() {
    let db = Arc::new(setup().await);
    let main = db.create_branch(&BranchMeta { name: "main".into() }).await.unwrap();

    let worker = {
        let db = Arc::clone(&db);
        tokio::spawn(async move { insert(&db, main, &["from task"]).await })
    };
    let (commit, _) = worker.await.unwrap();

    assert_eq!(as_of(&db, main, commit).await[0].fields.name, "from task");
    let stored = db
        .store()
        .fetch_all(&Query::select_from(Variable::TABLE).filter(Condition::eq(VALID_FROM, commit)))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}
