//! Pipeline counters shared by producers, the worker, and write tasks.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for the batching pipeline.
#[derive(Debug, Default)]
pub struct BatcherStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    flushed_batches: AtomicU64,
    flushed_records: AtomicU64,
    failed_batches: AtomicU64,
    failed_records: AtomicU64,
}

/// Point-in-time copy of [`BatcherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Records admitted to the ingress queue.
    pub accepted: u64,
    /// Records rejected because the queue was full or the worker had exited.
    pub dropped: u64,
    /// Batches the sink confirmed.
    pub flushed_batches: u64,
    pub flushed_records: u64,
    /// Batches lost to a sink error or deadline.
    pub failed_batches: u64,
    pub failed_records: u64,
}

impl BatcherStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_ok(&self, rows: usize) {
        self.flushed_batches.fetch_add(1, Ordering::Relaxed);
        self.flushed_records.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_failed(&self, rows: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.failed_records.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Records admitted but not yet confirmed or failed (queued, buffered, or in flight).
    pub fn unsettled(&self) -> u64 {
        self.accepted
            .saturating_sub(self.flushed_records)
            .saturating_sub(self.failed_records)
    }
}
