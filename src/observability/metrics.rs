//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only when the registry is created

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one `VersionedDb`.
///
/// All counters use Relaxed ordering: values are exact once the
/// incrementing operations have completed, but carry no happens-before.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    branches_created: AtomicU64,
    commits_created: AtomicU64,
    rows_inserted: AtomicU64,
    rows_updated: AtomicU64,
    rows_deleted: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    serialization_failures: AtomicU64,
    invariant_violations: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_branches_created(&self) {
        self.branches_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits_created(&self) {
        self.commits_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rows_inserted(&self) {
        self.rows_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rows_updated(&self) {
        self.rows_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rows_deleted(&self) {
        self.rows_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_rolled_back(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_serialization_failures(&self) {
        self.serialization_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invariant_violations(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            branches_created: self.branches_created.load(Ordering::Relaxed),
            commits_created: self.commits_created.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            rows_updated: self.rows_updated.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
        }
    }
}

/// Immutable copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub branches_created: u64,
    pub commits_created: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub serialization_failures: u64,
    pub invariant_violations: u64,
}
