//! Process-wide mutation counters fed by the transaction manager.
//!
//! Counters are relaxed atomics: independent invocations update them
//! concurrently and a snapshot is only approximately consistent across fields.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::txn::MutationKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub rows_inserted: u64,
    pub rows_deleted: u64,
    pub commit_latency_ns: u64,
    pub mutation_latency_ns: u64,
}

impl MetricsSnapshot {
    /// Average time spent in COMMIT per committed transaction.
    pub fn mean_commit_latency(&self) -> Duration {
        match self.commits {
            0 => Duration::ZERO,
            n => Duration::from_nanos(self.commit_latency_ns / n),
        }
    }

    /// Transactions opened but not yet committed or rolled back.
    pub fn in_flight(&self) -> u64 {
        self.begins.saturating_sub(self.commits + self.rollbacks)
    }
}

#[derive(Debug, Default)]
pub struct MutationMetrics {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    rows_inserted: AtomicU64,
    rows_deleted: AtomicU64,
    commit_latency_ns: AtomicU64,
    mutation_latency_ns: AtomicU64,
}

fn nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

impl MutationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_begin(&self) {
        self.begins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self, kind: MutationKind, rows: u64, commit: Duration, total: Duration) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            MutationKind::Insert => &self.rows_inserted,
            MutationKind::Delete => &self.rows_deleted,
        };
        counter.fetch_add(rows, Ordering::Relaxed);
        self.commit_latency_ns
            .fetch_add(nanos(commit), Ordering::Relaxed);
        self.mutation_latency_ns
            .fetch_add(nanos(total), Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            begins: self.begins.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            commit_latency_ns: self.commit_latency_ns.load(Ordering::Relaxed),
            mutation_latency_ns: self.mutation_latency_ns.load(Ordering::Relaxed),
        }
    }
}
