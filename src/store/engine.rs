//! In-memory relational engine
//!
//! A reference `Store` for tests and embedded use.
//!
//! # Transactions
//!
//! - BEGIN captures a snapshot of committed tables (copy-on-write `Arc`s)
//! - Reads and writes go to the transaction's private view
//! - Generated ids and row keys are drawn from shared sequences and are
//!   never reused, even on rollback
//! - COMMIT validates against the conflict log, then applies after-images
//!   to the committed tables under a single lock
//! - Read-only transactions always commit
//!
//! # Guarantees
//!
//! - Readers never observe partial commits
//! - Under `Serializable`, two transactions whose reads overlap each
//!   other's writes cannot both commit
//! - Dropping an unfinished transaction discards its writes

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::conflict::{CommittedWrite, ConflictLog, ReadRecord};
use super::errors::{StorageError, StorageResult};
use super::index::{CompositeIndex, IndexKey, RowKey};
use super::schema::TableDef;
use super::{IsolationLevel, Row, Store, StoreFuture, StoreTransaction};
use crate::query::{Query, RowSorter};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Yield to the async runtime before every round-trip, so concurrent
    /// transactions interleave the way they would against a remote store.
    #[serde(default = "default_yield_on_round_trip")]
    pub yield_on_round_trip: bool,

    /// Maximum committed writes retained for validation. Transactions whose
    /// snapshot predates evicted history fail with a serialization failure.
    #[serde(default = "default_conflict_log_limit")]
    pub conflict_log_limit: usize,
}

fn default_yield_on_round_trip() -> bool {
    true
}

fn default_conflict_log_limit() -> usize {
    65_536
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            yield_on_round_trip: default_yield_on_round_trip(),
            conflict_log_limit: default_conflict_log_limit(),
        }
    }
}

#[derive(Debug, Clone)]
struct TableData {
    def: TableDef,
    rows: BTreeMap<RowKey, Row>,
    indexes: Vec<CompositeIndex>,
}

impl TableData {
    fn new(def: TableDef) -> Self {
        let indexes = def.indexes.iter().cloned().map(CompositeIndex::new).collect();
        Self {
            def,
            rows: BTreeMap::new(),
            indexes,
        }
    }

    fn put(&mut self, key: RowKey, row: Row) {
        if let Some(old) = self.rows.get(&key) {
            for index in &mut self.indexes {
                index.remove(old, key);
            }
        }
        for index in &mut self.indexes {
            index.insert(&row, key);
        }
        self.rows.insert(key, row);
    }

    /// Candidate row keys: the index with the longest pinned prefix, or a
    /// full scan when no index applies.
    fn candidates(&self, query: &Query) -> Vec<RowKey> {
        let best = self
            .indexes
            .iter()
            .map(|index| {
                let prefix: Vec<IndexKey> = index
                    .def()
                    .columns
                    .iter()
                    .map_while(|column| query.pinned_value(column))
                    .map(|value| IndexKey::from_json(&value))
                    .collect();
                (index, prefix)
            })
            .filter(|(_, prefix)| !prefix.is_empty())
            .max_by_key(|(_, prefix)| prefix.len());

        match best {
            Some((index, prefix)) => index.lookup_prefix(&prefix),
            None => self.rows.keys().copied().collect(),
        }
    }

    fn select(&self, query: &Query) -> Vec<(RowKey, Row)> {
        self.candidates(query)
            .into_iter()
            .filter_map(|key| self.rows.get(&key).map(|row| (key, row)))
            .filter(|(_, row)| query.matches(row))
            .map(|(key, row)| (key, row.clone()))
            .collect()
    }

    fn contains_generated(&self, value: &Value) -> bool {
        match self.def.generated_column() {
            Some(column) => {
                let lookup = Query::select_from(self.def.name.clone())
                    .filter(crate::query::Condition::Eq(column.name.clone(), value.clone()));
                !self.select(&lookup).is_empty()
            }
            None => false,
        }
    }
}

type Tables = HashMap<String, Arc<TableData>>;

fn table<'t>(tables: &'t Tables, name: &str) -> StorageResult<&'t Arc<TableData>> {
    tables
        .get(name)
        .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
}

fn execute(tables: &Tables, query: &Query) -> StorageResult<Vec<Row>> {
    let data = table(tables, query.table())?;
    let mut rows: Vec<Row> = data.select(query).into_iter().map(|(_, row)| row).collect();
    RowSorter::sort(&mut rows, query.order());
    if let Some(limit) = query.limit_value() {
        rows.truncate(limit);
    }
    Ok(rows)
}

fn check_foreign_keys(tables: &Tables, def: &TableDef, row: &Row) -> StorageResult<()> {
    for column in &def.columns {
        let Some(references) = &column.references else {
            continue;
        };
        let value = match row.get(&column.name) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        if !table(tables, references)?.contains_generated(value) {
            return Err(StorageError::ForeignKeyViolation {
                table: def.name.clone(),
                column: column.name.clone(),
                references: references.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug)]
struct EngineState {
    tables: Tables,
    commit_seq: u64,
    sequences: HashMap<String, i64>,
    next_row_key: RowKey,
    conflicts: ConflictLog,
    /// snapshot seq -> number of open transactions reading at it
    active: BTreeMap<u64, usize>,
}

impl EngineState {
    fn release_snapshot(&mut self, snapshot_seq: u64) {
        if let Some(count) = self.active.get_mut(&snapshot_seq) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(&snapshot_seq);
            }
        }
        let oldest = self.active.keys().next().copied();
        self.conflicts.prune(oldest);
    }
}

fn lock(shared: &Mutex<EngineState>) -> StorageResult<MutexGuard<'_, EngineState>> {
    shared
        .lock()
        .map_err(|_| StorageError::Internal("engine state lock poisoned".to_string()))
}

async fn round_trip(config: &MemoryStoreConfig) {
    if config.yield_on_round_trip {
        tokio::task::yield_now().await;
    }
}

/// In-memory `Store`. Clones share the same database.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<EngineState>>,
    config: MemoryStoreConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        let state = EngineState {
            tables: HashMap::new(),
            commit_seq: 0,
            sequences: HashMap::new(),
            next_row_key: 0,
            conflicts: ConflictLog::new(config.conflict_log_limit),
            active: BTreeMap::new(),
        };
        Self {
            shared: Arc::new(Mutex::new(state)),
            config,
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// Number of commits that wrote at least one row.
    pub fn commit_sequence(&self) -> StorageResult<u64> {
        Ok(lock(&self.shared)?.commit_seq)
    }

    /// Number of transactions currently open.
    pub fn active_transactions(&self) -> StorageResult<usize> {
        Ok(lock(&self.shared)?.active.values().sum())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    type Transaction = MemoryTransaction;

    fn create_table(&self, def: TableDef) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            round_trip(&self.config).await;
            def.validate()?;

            let mut state = lock(&self.shared)?;
            if state.tables.contains_key(&def.name) {
                return Err(StorageError::TableExists(def.name));
            }
            for column in &def.columns {
                if let Some(references) = &column.references {
                    let target = table(&state.tables, references)?;
                    if target.def.generated_column().is_none() {
                        return Err(StorageError::Internal(format!(
                            "{}.{} references {} which has no generated column",
                            def.name, column.name, references
                        )));
                    }
                }
            }
            state.sequences.insert(def.name.clone(), 0);
            state
                .tables
                .insert(def.name.clone(), Arc::new(TableData::new(def)));
            Ok(())
        })
    }

    fn begin(&self, isolation: IsolationLevel) -> StoreFuture<'_, MemoryTransaction> {
        Box::pin(async move {
            round_trip(&self.config).await;
            let mut state = lock(&self.shared)?;
            let snapshot_seq = state.commit_seq;
            *state.active.entry(snapshot_seq).or_insert(0) += 1;
            Ok(MemoryTransaction {
                shared: Arc::clone(&self.shared),
                config: self.config.clone(),
                isolation,
                snapshot_seq,
                view: state.tables.clone(),
                reads: Vec::new(),
                writes: Vec::new(),
                finished: false,
            })
        })
    }

    fn fetch_all<'a>(&'a self, query: &'a Query) -> StoreFuture<'a, Vec<Row>> {
        Box::pin(async move {
            round_trip(&self.config).await;
            let state = lock(&self.shared)?;
            execute(&state.tables, query)
        })
    }
}

#[derive(Debug)]
struct PendingWrite {
    table: String,
    key: RowKey,
    before: Option<Row>,
    after: Row,
}

/// A transaction on a `MemoryStore`.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Mutex<EngineState>>,
    config: MemoryStoreConfig,
    isolation: IsolationLevel,
    snapshot_seq: u64,
    view: Tables,
    reads: Vec<ReadRecord>,
    writes: Vec<PendingWrite>,
    finished: bool,
}

impl MemoryTransaction {
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.finished {
            return Err(StorageError::TransactionFinished);
        }
        Ok(())
    }

    fn table_def(&self, name: &str) -> StorageResult<TableDef> {
        Ok(table(&self.view, name)?.def.clone())
    }

    fn table_mut(&mut self, name: &str) -> StorageResult<&mut TableData> {
        self.view
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
    }

    fn insert_now(&mut self, table_name: &str, values: Row) -> StorageResult<Row> {
        let def = self.table_def(table_name)?;
        def.check_writable(&values)?;

        let mut row = values;
        let key = {
            let mut state = lock(&self.shared)?;
            if let Some(column) = def.generated_column() {
                let sequence = state.sequences.entry(def.name.clone()).or_insert(0);
                *sequence += 1;
                row.insert(column.name.clone(), Value::from(*sequence));
            }
            state.next_row_key += 1;
            state.next_row_key
        };

        let row = def.normalize(row)?;
        check_foreign_keys(&self.view, &def, &row)?;

        self.table_mut(table_name)?.put(key, row.clone());
        self.writes.push(PendingWrite {
            table: def.name,
            key,
            before: None,
            after: row.clone(),
        });
        Ok(row)
    }

    fn update_now(&mut self, query: &Query, changes: Row) -> StorageResult<Vec<Row>> {
        let def = self.table_def(query.table())?;
        def.check_writable(&changes)?;

        self.reads.push(ReadRecord {
            table: def.name.clone(),
            conditions: query.conditions().to_vec(),
        });

        let matched = table(&self.view, &def.name)?.select(query);
        let mut staged = Vec::with_capacity(matched.len());
        for (key, before) in matched {
            let mut after = before.clone();
            for (column, value) in &changes {
                after.insert(column.clone(), value.clone());
            }
            let after = def.normalize(after)?;
            check_foreign_keys(&self.view, &def, &after)?;
            staged.push((key, before, after));
        }

        let data = self.table_mut(&def.name)?;
        let mut updated = Vec::with_capacity(staged.len());
        for (key, _, after) in &staged {
            data.put(*key, after.clone());
            updated.push(after.clone());
        }
        for (key, before, after) in staged {
            self.writes.push(PendingWrite {
                table: def.name.clone(),
                key,
                before: Some(before),
                after,
            });
        }
        Ok(updated)
    }

    fn fetch_now(&mut self, query: &Query) -> StorageResult<Vec<Row>> {
        let rows = execute(&self.view, query)?;
        self.reads.push(ReadRecord {
            table: query.table().to_string(),
            conditions: query.conditions().to_vec(),
        });
        Ok(rows)
    }

    fn commit_now(&mut self) -> StorageResult<()> {
        let mut state = lock(&self.shared)?;
        self.finished = true;

        if self.writes.is_empty() {
            state.release_snapshot(self.snapshot_seq);
            return Ok(());
        }

        let written: BTreeSet<(String, RowKey)> = self
            .writes
            .iter()
            .map(|w| (w.table.clone(), w.key))
            .collect();
        let verdict =
            state
                .conflicts
                .validate(self.snapshot_seq, self.isolation, &self.reads, &written);
        if !verdict.is_ok() {
            state.release_snapshot(self.snapshot_seq);
            return Err(StorageError::SerializationFailure(verdict.describe()));
        }

        let seq = state.commit_seq + 1;
        let mut committed = Vec::with_capacity(self.writes.len());
        for write in self.writes.drain(..) {
            let data = state
                .tables
                .get_mut(&write.table)
                .map(Arc::make_mut)
                .ok_or_else(|| StorageError::UnknownTable(write.table.clone()))?;
            data.put(write.key, write.after.clone());
            committed.push(CommittedWrite {
                seq,
                table: write.table,
                key: write.key,
                before: write.before,
                after: write.after,
            });
        }
        state.commit_seq = seq;
        state.conflicts.record(committed);
        state.release_snapshot(self.snapshot_seq);
        Ok(())
    }

    fn abort(&mut self) -> StorageResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writes.clear();
        let mut state = lock(&self.shared)?;
        state.release_snapshot(self.snapshot_seq);
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    fn insert<'a>(&'a mut self, table: &'a str, values: Row) -> StoreFuture<'a, Row> {
        Box::pin(async move {
            self.ensure_active()?;
            round_trip(&self.config).await;
            self.insert_now(table, values)
        })
    }

    fn fetch_all<'a>(&'a mut self, query: &'a Query) -> StoreFuture<'a, Vec<Row>> {
        Box::pin(async move {
            self.ensure_active()?;
            round_trip(&self.config).await;
            self.fetch_now(query)
        })
    }

    fn update<'a>(&'a mut self, query: &'a Query, changes: Row) -> StoreFuture<'a, Vec<Row>> {
        Box::pin(async move {
            self.ensure_active()?;
            round_trip(&self.config).await;
            self.update_now(query, changes)
        })
    }

    fn commit(mut self) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.ensure_active()?;
            round_trip(&self.config).await;
            self.commit_now()
        })
    }

    fn rollback(mut self) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.ensure_active()?;
            round_trip(&self.config).await;
            self.abort()
        })
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            let mut state = match self.shared.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.release_snapshot(self.snapshot_seq);
        }
    }
}
