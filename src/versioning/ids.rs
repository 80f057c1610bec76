//! Identifiers
//!
//! - `BranchId`, `CommitId`: assigned by the store's generated id column,
//!   never by an in-process counter. Commit ids are strictly increasing
//!   across all branches, so they totally order every write.
//! - `RowId`: random v4 UUID string, generated per lineage at insert.
//!   Shared by every version of that lineage on its branch.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Branch identity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(i64);

impl BranchId {
    #[inline]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BranchId> for Value {
    fn from(id: BranchId) -> Self {
        Value::from(id.0)
    }
}

/// A totally ordered commit identity.
///
/// Ordering is global, not per branch: commit 7 on one branch happened
/// after commit 6 on any other branch was created.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(i64);

impl CommitId {
    #[inline]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CommitId> for Value {
    fn from(id: CommitId) -> Self {
        Value::from(id.0)
    }
}

/// Lineage identity. Never supplied by callers.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Generates a fresh, globally unique id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an id previously returned by the store.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&RowId> for Value {
    fn from(id: &RowId) -> Self {
        Value::String(id.0.clone())
    }
}
