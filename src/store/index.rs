//! BTreeMap-based composite indexes
//!
//! Indexes map a tuple of column values to the set of row keys holding
//! them. Row keys are returned sorted ascending, which is also storage
//! order, so indexed and scanned reads produce identical results.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use serde_json::Value;

use super::schema::IndexDef;
use super::Row;

/// Engine-internal physical row identity.
pub type RowKey = u64;

/// Index key for a single column value.
///
/// Ordering is deterministic: Null < Bool < Int < Float < String < Json.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    /// Float stored as order-preserving bits
    Float(u64),
    String(String),
    /// Arrays and objects, keyed by their serialized form
    Json(String),
}

impl IndexKey {
    /// Create a key from a JSON value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => IndexKey::Int(i),
                None => IndexKey::from_float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => IndexKey::String(s.clone()),
            other => IndexKey::Json(other.to_string()),
        }
    }

    /// Uses bit representation for total ordering.
    fn from_float(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Float(ordered)
    }
}

/// A composite index over one or more columns.
#[derive(Debug, Clone)]
pub struct CompositeIndex {
    def: IndexDef,
    tree: BTreeMap<Vec<IndexKey>, BTreeSet<RowKey>>,
}

impl CompositeIndex {
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            tree: BTreeMap::new(),
        }
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    fn key_for(&self, row: &Row) -> Vec<IndexKey> {
        self.def
            .columns
            .iter()
            .map(|c| IndexKey::from_json(row.get(c).unwrap_or(&Value::Null)))
            .collect()
    }

    pub fn insert(&mut self, row: &Row, key: RowKey) {
        let index_key = self.key_for(row);
        self.tree.entry(index_key).or_default().insert(key);
    }

    /// Removes the row. If the tuple has no more rows, removes it entirely.
    pub fn remove(&mut self, row: &Row, key: RowKey) {
        let index_key = self.key_for(row);
        if let Some(keys) = self.tree.get_mut(&index_key) {
            keys.remove(&key);
            if keys.is_empty() {
                self.tree.remove(&index_key);
            }
        }
    }

    /// Returns the row keys whose leading columns equal `prefix`, ascending.
    pub fn lookup_prefix(&self, prefix: &[IndexKey]) -> Vec<RowKey> {
        let start = Bound::Included(prefix.to_vec());
        let mut keys: Vec<RowKey> = self
            .tree
            .range((start, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Number of distinct tuples (for tests and diagnostics).
    pub fn tuple_count(&self) -> usize {
        self.tree.len()
    }
}
