//! branchline - Git-like branches and commits over a relational store
//!
//! - Versioned tables keep every version of every row
//! - Commits are totally ordered; any past state of a branch is queryable
//! - Writes run in serializable transactions
//!
//! ```ignore
//! let db: VersionedDb<MemoryStore, BranchMeta, CommitMeta> = VersionedDb::new(store);
//! let main = db.create_branch(&BranchMeta { name: "main".into() }).await?;
//!
//! let commit_id = db
//!     .execute_write_transaction(move |tx| {
//!         Box::pin(async move {
//!             let mut commit = tx.create_commit(main, &CommitMeta::default()).await?;
//!             commit.insert(&Variable { name: "Obesity".into() }).await?;
//!             Ok::<_, VersionError>(commit.id())
//!         })
//!     })
//!     .await?;
//!
//! let rows = db
//!     .fetch_all(&TemporalQuery::select_as_of::<Variable>(main, commit_id))
//!     .await?;
//! ```

pub mod config;
pub mod observability;
pub mod query;
pub mod store;
pub mod versioning;

pub use config::{CommitPolicy, ConfigError, VersioningConfig};
pub use query::{Condition, Query, SortDirection};
pub use store::{MemoryStore, StorageError};
pub use versioning::{
    Branch, BranchId, Commit, CommitId, RowId, TemporalQuery, VersionError, VersionResult,
    VersionedDb, VersionedRow, VersionedSchema, VersionedTable, WriteTransaction,
};
