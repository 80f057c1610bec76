//! Table definitions
//!
//! A table is a fixed set of typed columns plus secondary indexes.
//! Rows are validated against the definition on every insert and update:
//! - Unknown columns are rejected
//! - Generated columns are assigned by the store, never by the caller
//! - NOT NULL and type checks apply to every column
//! - Missing nullable columns are stored as explicit NULL

use std::fmt;

use serde_json::Value;

use super::errors::{StorageError, StorageResult};
use super::Row;

/// Column value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit signed integer
    Integer,
    /// Floating point number
    Real,
    /// UTF-8 string
    Text,
    /// true / false
    Boolean,
    /// Arbitrary JSON (arrays, objects, scalars)
    Json,
}

impl ColumnType {
    /// Returns true if a non-null value has this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ColumnType::Integer => value.as_i64().is_some(),
            ColumnType::Real => value.is_number(),
            ColumnType::Text => value.is_string(),
            ColumnType::Boolean => value.is_boolean(),
            ColumnType::Json => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Json => "JSON",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Store-assigned, strictly increasing integer (one per table).
    pub generated: bool,
    /// Table whose generated column this column must reference.
    pub references: Option<String>,
}

impl ColumnDef {
    /// A nullable column of the given type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            generated: false,
            references: None,
        }
    }

    /// An INTEGER primary key assigned by the store.
    pub fn generated_id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Integer,
            nullable: false,
            generated: true,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }
}

/// A composite secondary index. Column order matters: lookups use the
/// longest prefix pinned by equality or IS NULL conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The generated column, if the table has one.
    pub fn generated_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.generated)
    }

    /// Checks that column and index names are consistent.
    pub fn validate(&self) -> StorageResult<()> {
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StorageError::Internal(format!(
                    "duplicate column {}.{}",
                    self.name, column.name
                )));
            }
        }
        if self.columns.iter().filter(|c| c.generated).count() > 1 {
            return Err(StorageError::Internal(format!(
                "table {} declares more than one generated column",
                self.name
            )));
        }
        for index in &self.indexes {
            for column in &index.columns {
                if self.get_column(column).is_none() {
                    return Err(StorageError::UnknownColumn {
                        table: self.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Rejects caller-supplied values for unknown or generated columns.
    pub fn check_writable(&self, values: &Row) -> StorageResult<()> {
        for key in values.keys() {
            match self.get_column(key) {
                None => {
                    return Err(StorageError::UnknownColumn {
                        table: self.name.clone(),
                        column: key.clone(),
                    })
                }
                Some(column) if column.generated => {
                    return Err(StorageError::GeneratedColumn {
                        table: self.name.clone(),
                        column: key.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validates a complete row and fills missing nullable columns with NULL.
    pub fn normalize(&self, mut row: Row) -> StorageResult<Row> {
        for column in &self.columns {
            let value = row.entry(column.name.clone()).or_insert(Value::Null);
            if value.is_null() {
                if !column.nullable {
                    return Err(StorageError::NotNullViolation {
                        table: self.name.clone(),
                        column: column.name.clone(),
                    });
                }
                continue;
            }
            if !column.column_type.accepts(value) {
                return Err(StorageError::TypeMismatch {
                    table: self.name.clone(),
                    column: column.name.clone(),
                    expected: column.column_type,
                });
            }
        }
        Ok(row)
    }
}
