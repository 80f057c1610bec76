//! Storage error types
//!
//! Error codes:
//! - BRANCHLINE_SERIALIZATION_FAILURE (retryable by the caller)
//! - BRANCHLINE_CONSTRAINT_VIOLATION (NOT NULL, type, foreign key, generated column)
//! - BRANCHLINE_SCHEMA_ERROR (unknown table/column, duplicate table)
//! - BRANCHLINE_TRANSACTION_FINISHED
//! - BRANCHLINE_STORAGE_INTERNAL

use thiserror::Error;

use super::schema::ColumnType;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a `Store` or `StoreTransaction`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("NOT NULL constraint failed: {table}.{column}")]
    NotNullViolation { table: String, column: String },

    #[error("Type mismatch on {table}.{column}: expected {expected}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: ColumnType,
    },

    #[error("FOREIGN KEY constraint failed: {table}.{column} references {references}")]
    ForeignKeyViolation {
        table: String,
        column: String,
        references: String,
    },

    #[error("Generated column {table}.{column} cannot be written")]
    GeneratedColumn { table: String, column: String },

    #[error("Transaction already finished")]
    TransactionFinished,

    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::SerializationFailure(_) => "BRANCHLINE_SERIALIZATION_FAILURE",
            StorageError::NotNullViolation { .. }
            | StorageError::TypeMismatch { .. }
            | StorageError::ForeignKeyViolation { .. }
            | StorageError::GeneratedColumn { .. } => "BRANCHLINE_CONSTRAINT_VIOLATION",
            StorageError::UnknownTable(_)
            | StorageError::TableExists(_)
            | StorageError::UnknownColumn { .. } => "BRANCHLINE_SCHEMA_ERROR",
            StorageError::TransactionFinished => "BRANCHLINE_TRANSACTION_FINISHED",
            StorageError::Internal(_) => "BRANCHLINE_STORAGE_INTERNAL",
        }
    }

    /// True if the transaction lost a serializable conflict and may be retried.
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, StorageError::SerializationFailure(_))
    }

    /// True for NOT NULL, type, foreign key and generated-column violations.
    pub fn is_constraint_violation(&self) -> bool {
        self.code() == "BRANCHLINE_CONSTRAINT_VIOLATION"
    }
}
