//! Backend-level counters.
//!
//! Counters are plain relaxed atomics: they are observational and never
//! influence cache behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of backend counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendMetrics {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub expirations: u64,
    pub computes: u64,
}

impl BackendMetrics {
    /// Fraction of reads that hit, or `None` before the first read.
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

/// Live counters shared by every store handle over one table.
#[derive(Debug, Default)]
pub(crate) struct BackendCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    expirations: AtomicU64,
    computes: AtomicU64,
}

impl BackendCounters {
    pub(crate) fn snapshot(&self) -> BackendMetrics {
        BackendMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn inc_compute(&self) {
        self.computes.fetch_add(1, Ordering::Relaxed);
    }
}
