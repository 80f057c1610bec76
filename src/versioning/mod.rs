//! Branch and commit versioning
//!
//! Rows of versioned tables are never overwritten. Each write closes the
//! current version of a record and, unless it is a delete, opens a new
//! one stamped with the writing commit. Any past state of a branch can
//! then be read back with `TemporalQuery::select_as_of`.

mod branch;
mod commit;
mod db;
mod errors;
mod ids;
mod row;
mod schema;
mod temporal;
mod transaction;

pub use branch::BranchRegistry;
pub use commit::Commit;
pub use db::VersionedDb;
pub use errors::{Severity, VersionError, VersionResult};
pub use ids::{BranchId, CommitId, RowId};
pub use row::{
    Branch, CommitInfo, VersionedRow, VersionedTable, BRANCH_ID, ID, SYSTEM_COLUMNS, VALID_FROM,
    VALID_UNTIL,
};
pub use schema::{VersionedSchema, BRANCH_TABLE, COMMIT_TABLE};
pub use temporal::{TemporalQuery, TypedQuery};
pub use transaction::{BoxFuture, TransactionCoordinator, WriteTransaction};
