//! Conflict detection - optimistic validation at commit time
//!
//! Every committed write is logged with the commit sequence that made it
//! visible. A transaction validates against the writes committed after
//! its snapshot was taken:
//!
//! - Write-write: another transaction committed a write to a row we wrote
//! - Read-write (serializable only): another transaction committed a write
//!   whose before- or after-image matches a predicate we read with
//!
//! Strategy: first committer wins. The loser aborts with a serialization
//! failure and the caller decides whether to retry.

use std::collections::{BTreeSet, VecDeque};

use super::index::RowKey;
use super::{IsolationLevel, Row};
use crate::query::{matches_all, Condition};

/// A predicate read performed by a transaction.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl ReadRecord {
    fn observes(&self, table: &str, row: &Row) -> bool {
        self.table == table && matches_all(row, &self.conditions)
    }
}

/// A write made visible by a committed transaction.
#[derive(Debug, Clone)]
pub struct CommittedWrite {
    pub seq: u64,
    pub table: String,
    pub key: RowKey,
    pub before: Option<Row>,
    pub after: Row,
}

/// Outcome of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    NoConflict,
    /// A committed write changed rows matching one of our read predicates
    ReadWrite { table: String, seq: u64 },
    /// A committed write touched a row we also wrote
    WriteWrite { table: String, key: RowKey, seq: u64 },
    /// The log no longer reaches back to our snapshot
    HistoryTruncated { snapshot_seq: u64 },
}

impl ConflictResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConflictResult::NoConflict)
    }

    pub fn describe(&self) -> String {
        match self {
            ConflictResult::NoConflict => "no conflict".to_string(),
            ConflictResult::ReadWrite { table, seq } => format!(
                "rows read from '{}' were changed by a concurrent commit (seq {})",
                table, seq
            ),
            ConflictResult::WriteWrite { table, key, seq } => format!(
                "row {} in '{}' was also written by a concurrent commit (seq {})",
                key, table, seq
            ),
            ConflictResult::HistoryTruncated { snapshot_seq } => format!(
                "conflict history no longer covers snapshot {}",
                snapshot_seq
            ),
        }
    }
}

/// Log of recently committed writes.
#[derive(Debug)]
pub struct ConflictLog {
    writes: VecDeque<CommittedWrite>,
    limit: usize,
    /// Highest sequence evicted because of `limit`
    truncated_through: u64,
}

impl ConflictLog {
    pub fn new(limit: usize) -> Self {
        Self {
            writes: VecDeque::new(),
            limit,
            truncated_through: 0,
        }
    }

    /// Validates a transaction that read at `snapshot_seq`.
    pub fn validate(
        &self,
        snapshot_seq: u64,
        isolation: IsolationLevel,
        reads: &[ReadRecord],
        written: &BTreeSet<(String, RowKey)>,
    ) -> ConflictResult {
        if snapshot_seq < self.truncated_through {
            return ConflictResult::HistoryTruncated { snapshot_seq };
        }

        for write in self.writes.iter().filter(|w| w.seq > snapshot_seq) {
            if written.contains(&(write.table.clone(), write.key)) {
                return ConflictResult::WriteWrite {
                    table: write.table.clone(),
                    key: write.key,
                    seq: write.seq,
                };
            }

            if isolation == IsolationLevel::Serializable {
                let observed = reads.iter().any(|read| {
                    read.observes(&write.table, &write.after)
                        || write
                            .before
                            .as_ref()
                            .is_some_and(|before| read.observes(&write.table, before))
                });
                if observed {
                    return ConflictResult::ReadWrite {
                        table: write.table.clone(),
                        seq: write.seq,
                    };
                }
            }
        }

        ConflictResult::NoConflict
    }

    pub fn record(&mut self, writes: impl IntoIterator<Item = CommittedWrite>) {
        self.writes.extend(writes);
    }

    /// Drops writes no active snapshot can conflict with, then enforces the
    /// size limit.
    pub fn prune(&mut self, oldest_active_snapshot: Option<u64>) {
        match oldest_active_snapshot {
            Some(oldest) => {
                while self.writes.front().is_some_and(|w| w.seq <= oldest) {
                    self.writes.pop_front();
                }
            }
            None => self.writes.clear(),
        }

        while self.writes.len() > self.limit {
            if let Some(evicted) = self.writes.pop_front() {
                self.truncated_through = self.truncated_through.max(evicted.seq);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}
