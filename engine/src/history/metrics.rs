//! History store counters
//!
//! Incremented at the call site, read through [`HistoryMetrics::snapshot`].
//! [`HistoryMetrics::flush`] emits the current values as one `info!` event.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HistoryMetrics {
    records_appended: AtomicU64,
    duplicate_appends: AtomicU64,
    records_evicted: AtomicU64,
    eviction_failures: AtomicU64,
    decode_failures: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_appended: u64,
    pub duplicate_appends: u64,
    pub records_evicted: u64,
    pub eviction_failures: u64,
    pub decode_failures: u64,
}

impl HistoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_appended(&self) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate(&self) {
        self.duplicate_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_evicted(&self) {
        self.records_evicted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "records_evicted", "counter incremented");
    }

    pub fn inc_eviction_failure(&self) {
        self.eviction_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "eviction_failures", "counter incremented");
    }

    pub fn inc_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decode_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_appended: self.records_appended.load(Ordering::Relaxed),
            duplicate_appends: self.duplicate_appends.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            eviction_failures: self.eviction_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "history",
            records_appended = s.records_appended,
            duplicate_appends = s.duplicate_appends,
            records_evicted = s.records_evicted,
            eviction_failures = s.eviction_failures,
            decode_failures = s.decode_failures,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_independently() {
        let metrics = HistoryMetrics::new();
        metrics.inc_appended();
        metrics.inc_appended();
        metrics.inc_decode_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_appended, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.records_evicted, 0);
    }
}
