//! Versioned row shapes
//!
//! Every versioned table carries four system columns next to the caller's
//! own columns:
//!
//! | column        | meaning                                           |
//! |---------------|---------------------------------------------------|
//! | `id`          | lineage id, shared by all versions of one record |
//! | `branch_id`   | owning branch                                     |
//! | `valid_from`  | commit that created this version                  |
//! | `valid_until` | commit that superseded it, NULL while open        |
//!
//! A version is visible at commit C iff `valid_from <= C` and
//! (`valid_until` is NULL or `C < valid_until`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{VersionError, VersionResult};
use super::ids::{BranchId, CommitId, RowId};
use crate::store::{Row, StorageError};

pub const ID: &str = "id";
pub const BRANCH_ID: &str = "branch_id";
pub const VALID_FROM: &str = "valid_from";
pub const VALID_UNTIL: &str = "valid_until";

/// Columns managed by branchline on every versioned table.
pub const SYSTEM_COLUMNS: [&str; 4] = [ID, BRANCH_ID, VALID_FROM, VALID_UNTIL];

/// A caller record stored in a versioned table.
///
/// The record serializes to a JSON object holding only the caller's own
/// columns. Field names must match the table's column names.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Variable { name: String }
///
/// impl VersionedTable for Variable {
///     const TABLE: &'static str = "variable";
/// }
/// ```
pub trait VersionedTable: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
}

/// One version of a record, as returned by temporal queries.
///
/// `T` must not use `deny_unknown_fields`; it is decoded from the same
/// object as the system columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRow<T> {
    pub id: RowId,
    pub branch_id: BranchId,
    pub valid_from: CommitId,
    pub valid_until: Option<CommitId>,
    #[serde(flatten)]
    pub fields: T,
}

impl<T> VersionedRow<T> {
    /// True while no commit has superseded this version.
    pub fn is_open(&self) -> bool {
        self.valid_until.is_none()
    }

    /// True if this version is the one visible at `commit`.
    pub fn is_valid_at(&self, commit: CommitId) -> bool {
        self.valid_from <= commit && self.valid_until.map_or(true, |until| commit < until)
    }
}

impl<T: DeserializeOwned> VersionedRow<T> {
    pub(crate) fn from_row(row: Row) -> VersionResult<Self> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}

/// A branch and its caller-defined metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch<B> {
    pub id: BranchId,
    #[serde(flatten)]
    pub metadata: B,
}

/// A commit and its caller-defined metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo<C> {
    pub id: CommitId,
    #[serde(flatten)]
    pub metadata: C,
}

/// Serializes `value` to a column map, rejecting any of `reserved`.
pub(crate) fn to_columns<V: Serialize + ?Sized>(
    table: &str,
    value: &V,
    reserved: &[&str],
) -> VersionResult<Row> {
    let columns = match serde_json::to_value(value)? {
        Value::Object(columns) => columns,
        other => {
            return Err(VersionError::invalid_record(
                table,
                format!("expected an object, got {}", json_kind(&other)),
            ))
        }
    };
    if let Some(column) = columns.keys().find(|k| reserved.contains(&k.as_str())) {
        return Err(VersionError::ReservedColumn {
            table: table.to_string(),
            column: column.clone(),
        });
    }
    Ok(columns)
}

/// Removes the system columns, leaving only the caller's own.
pub(crate) fn caller_columns(mut row: Row) -> Row {
    for column in SYSTEM_COLUMNS {
        row.remove(column);
    }
    row
}

/// Reads a store-generated integer id out of a returned row.
pub(crate) fn generated_id(table: &str, row: &Row) -> VersionResult<i64> {
    row.get(ID).and_then(Value::as_i64).ok_or_else(|| {
        VersionError::Storage(StorageError::Internal(format!(
            "{table} row returned without an integer {ID}"
        )))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
