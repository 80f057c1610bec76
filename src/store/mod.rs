//! Relational storage seam
//!
//! The versioning core talks to storage only through `Store` and
//! `StoreTransaction`. Durability, isolation and indexing are the store's
//! responsibility; the core holds no locks of its own.
//!
//! `MemoryStore` is the in-process reference engine:
//! - Generated integer ids (strictly increasing, never reused)
//! - NOT NULL, type and foreign-key constraints
//! - Composite BTreeMap indexes
//! - Snapshot reads, optimistic validation at commit
//!
//! Every method returns a boxed `Send` future; each call is one round-trip
//! and one suspension point.

mod conflict;
mod engine;
mod errors;
mod index;
mod schema;

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::query::Query;

pub use conflict::{CommittedWrite, ConflictLog, ConflictResult, ReadRecord};
pub use engine::{MemoryStore, MemoryStoreConfig, MemoryTransaction};
pub use errors::{StorageError, StorageResult};
pub use index::{CompositeIndex, IndexKey, RowKey};
pub use schema::{ColumnDef, ColumnType, IndexDef, TableDef};

/// A stored row: column name to value.
pub type Row = Map<String, Value>;

/// Future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Snapshot reads, first-committer-wins on rows written by both sides.
    Snapshot,
    /// Snapshot plus read-set validation: the net effect of concurrent
    /// transactions equals some serial order.
    Serializable,
}

/// A relational store.
pub trait Store: Send + Sync {
    type Transaction: StoreTransaction;

    /// Creates a table. Not transactional.
    fn create_table(&self, def: TableDef) -> StoreFuture<'_, ()>;

    /// Opens a transaction at the given isolation level.
    fn begin(&self, isolation: IsolationLevel) -> StoreFuture<'_, Self::Transaction>;

    /// Runs a query against the latest committed state.
    fn fetch_all<'a>(&'a self, query: &'a Query) -> StoreFuture<'a, Vec<Row>>;
}

/// An open transaction. Exclusively owned by one caller.
pub trait StoreTransaction: Send + 'static {
    /// INSERT ... RETURNING *. Generated columns are filled in by the store.
    fn insert<'a>(&'a mut self, table: &'a str, values: Row) -> StoreFuture<'a, Row>;

    /// SELECT * with the transaction's own writes visible.
    fn fetch_all<'a>(&'a mut self, query: &'a Query) -> StoreFuture<'a, Vec<Row>>;

    /// UPDATE ... SET changes WHERE query RETURNING *. Ordering and limit
    /// on the query are ignored.
    fn update<'a>(&'a mut self, query: &'a Query, changes: Row) -> StoreFuture<'a, Vec<Row>>;

    /// Makes all writes visible atomically, or fails with
    /// `StorageError::SerializationFailure` and discards them.
    fn commit(self) -> StoreFuture<'static, ()>;

    /// Discards all writes.
    fn rollback(self) -> StoreFuture<'static, ()>;
}
