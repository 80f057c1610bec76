//! Versioned schema
//!
//! Builds the `branch` and `commit` tables plus every versioned table,
//! adding the system columns and the indexes temporal queries rely on.

use super::errors::{VersionError, VersionResult};
use super::row::{VersionedTable, BRANCH_ID, ID, SYSTEM_COLUMNS, VALID_FROM, VALID_UNTIL};
use crate::observability::Event;
use crate::store::{ColumnDef, ColumnType, IndexDef, Store, TableDef};

pub const BRANCH_TABLE: &str = "branch";
pub const COMMIT_TABLE: &str = "commit";

/// Declarative schema for a versioned database.
#[derive(Debug, Clone, Default)]
pub struct VersionedSchema {
    branch_columns: Vec<ColumnDef>,
    commit_columns: Vec<ColumnDef>,
    tables: Vec<(String, Vec<ColumnDef>)>,
}

impl VersionedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a caller metadata column to the `branch` table.
    pub fn branch_metadata(mut self, column: ColumnDef) -> Self {
        self.branch_columns.push(column);
        self
    }

    /// Adds a caller metadata column to the `commit` table.
    pub fn commit_metadata(mut self, column: ColumnDef) -> Self {
        self.commit_columns.push(column);
        self
    }

    /// Declares a versioned table with the caller's own columns.
    pub fn versioned_table(mut self, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        self.tables.push((name.into(), columns));
        self
    }

    /// Declares the table backing `T`.
    pub fn versioned<T: VersionedTable>(self, columns: Vec<ColumnDef>) -> Self {
        self.versioned_table(T::TABLE, columns)
    }

    /// Expands the declaration into concrete table definitions, in
    /// creation order.
    pub fn table_defs(&self) -> VersionResult<Vec<TableDef>> {
        let mut defs = Vec::with_capacity(self.tables.len() + 2);
        defs.push(metadata_table(BRANCH_TABLE, &self.branch_columns)?);
        defs.push(metadata_table(COMMIT_TABLE, &self.commit_columns)?);

        for (name, columns) in &self.tables {
            if name == BRANCH_TABLE || name == COMMIT_TABLE {
                return Err(VersionError::invalid_record(
                    name,
                    "table name is reserved for branch and commit metadata",
                ));
            }
            let mut def = TableDef::new(name.as_str())
                .column(ColumnDef::new(ID, ColumnType::Text).not_null())
                .column(
                    ColumnDef::new(BRANCH_ID, ColumnType::Integer)
                        .not_null()
                        .references(BRANCH_TABLE),
                )
                .column(
                    ColumnDef::new(VALID_FROM, ColumnType::Integer)
                        .not_null()
                        .references(COMMIT_TABLE),
                )
                .column(ColumnDef::new(VALID_UNTIL, ColumnType::Integer).references(COMMIT_TABLE));
            for column in columns {
                if SYSTEM_COLUMNS.contains(&column.name.as_str()) {
                    return Err(VersionError::ReservedColumn {
                        table: name.clone(),
                        column: column.name.clone(),
                    });
                }
                def = def.column(column.clone());
            }
            def = def
                .index(IndexDef::new(
                    format!("{name}_branch_open"),
                    &[BRANCH_ID, VALID_UNTIL],
                ))
                .index(IndexDef::new(
                    format!("{name}_branch_window"),
                    &[BRANCH_ID, VALID_FROM, VALID_UNTIL],
                ))
                .index(IndexDef::new(
                    format!("{name}_lineage_open"),
                    &[ID, BRANCH_ID, VALID_UNTIL],
                ));
            defs.push(def);
        }
        Ok(defs)
    }

    /// Creates every table on `store`.
    pub async fn install<S: Store>(&self, store: &S) -> VersionResult<()> {
        let defs = self.table_defs()?;
        let tables = defs.len();
        for def in defs {
            store.create_table(def).await?;
        }
        tracing::info!(event = %Event::SchemaInstalled, tables, "versioned schema installed");
        Ok(())
    }
}

fn metadata_table(name: &str, columns: &[ColumnDef]) -> VersionResult<TableDef> {
    let mut def = TableDef::new(name).column(ColumnDef::generated_id(ID));
    for column in columns {
        if column.name == ID || column.generated {
            return Err(VersionError::ReservedColumn {
                table: name.to_string(),
                column: column.name.clone(),
            });
        }
        def = def.column(column.clone());
    }
    Ok(def)
}
