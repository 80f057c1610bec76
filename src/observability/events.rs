//! Observable events
//!
//! Every log line emitted by the crate carries an `event` field whose value
//! is one of these names. Names are stable and safe to alert on.

use std::fmt;

/// Observable events in branchline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Schema
    /// Versioned schema installed into a store
    SchemaInstalled,

    // Branches
    /// Branch row created
    BranchCreated,

    // Transactions
    /// Serializable transaction opened
    TxnBegin,
    /// Commit row created inside a transaction
    CommitCreated,
    /// Transaction committed
    TxnCommitted,
    /// Transaction rolled back after a caller failure
    TxnRolledBack,
    /// Rollback itself failed; the original failure is still returned
    TxnRollbackFailed,
    /// Store rejected the commit with a serialization failure
    SerializationConflict,

    // Rows
    /// New lineage opened
    RowInserted,
    /// Open row closed and replaced
    RowUpdated,
    /// Open row closed without replacement
    RowDeleted,
    /// Lookup found zero or several open rows for one lineage (FATAL)
    InvariantViolation,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::SchemaInstalled => "SCHEMA_INSTALLED",
            Event::BranchCreated => "BRANCH_CREATED",
            Event::TxnBegin => "TXN_BEGIN",
            Event::CommitCreated => "COMMIT_CREATED",
            Event::TxnCommitted => "TXN_COMMITTED",
            Event::TxnRolledBack => "TXN_ROLLED_BACK",
            Event::TxnRollbackFailed => "TXN_ROLLBACK_FAILED",
            Event::SerializationConflict => "SERIALIZATION_CONFLICT",
            Event::RowInserted => "ROW_INSERTED",
            Event::RowUpdated => "ROW_UPDATED",
            Event::RowDeleted => "ROW_DELETED",
            Event::InvariantViolation => "INVARIANT_VIOLATION",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
