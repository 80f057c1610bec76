//! Versioning error types
//!
//! Error codes:
//! - BRANCHLINE_STORAGE (ERROR, store failure passed through unchanged)
//! - BRANCHLINE_INVARIANT_VIOLATION (FATAL)
//! - BRANCHLINE_COMMIT_ALREADY_CREATED (ERROR)
//! - BRANCHLINE_RESERVED_COLUMN (ERROR)
//! - BRANCHLINE_INVALID_RECORD (ERROR)
//! - BRANCHLINE_ENCODING (ERROR)

use std::fmt;

use thiserror::Error;

use super::ids::{BranchId, CommitId, RowId};
use crate::store::StorageError;

/// Severity levels for versioning errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation failed; the caller may act on it
    Error,
    /// Data-integrity or programming error; do not retry
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Result type for versioning operations
pub type VersionResult<T> = Result<T, VersionError>;

#[derive(Debug, Error)]
pub enum VersionError {
    /// Any store failure, including serialization conflicts.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Update or delete found zero or several open rows for one lineage.
    #[error(
        "Invariant violation on {table}: expected exactly one open row for lineage {row_id} on branch {branch_id}, found {open_rows}"
    )]
    InvariantViolation {
        table: String,
        row_id: RowId,
        branch_id: BranchId,
        open_rows: usize,
    },

    #[error("Commit {existing} was already created in this transaction")]
    CommitAlreadyCreated { existing: CommitId },

    #[error("Column {column} is managed by branchline and cannot be written on {table}")]
    ReservedColumn { table: String, column: String },

    #[error("Invalid record for {table}: {reason}")]
    InvalidRecord { table: String, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl VersionError {
    pub fn code(&self) -> &'static str {
        match self {
            VersionError::Storage(_) => "BRANCHLINE_STORAGE",
            VersionError::InvariantViolation { .. } => "BRANCHLINE_INVARIANT_VIOLATION",
            VersionError::CommitAlreadyCreated { .. } => "BRANCHLINE_COMMIT_ALREADY_CREATED",
            VersionError::ReservedColumn { .. } => "BRANCHLINE_RESERVED_COLUMN",
            VersionError::InvalidRecord { .. } => "BRANCHLINE_INVALID_RECORD",
            VersionError::Encoding(_) => "BRANCHLINE_ENCODING",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            VersionError::InvariantViolation { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// True if the store aborted the transaction to preserve serializability.
    /// The whole transaction may be retried by the caller.
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, VersionError::Storage(e) if e.is_serialization_failure())
    }

    pub(crate) fn invalid_record(table: &str, reason: impl Into<String>) -> Self {
        VersionError::InvalidRecord {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}
