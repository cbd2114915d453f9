//! Audit pipeline metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector for audit pipeline monitoring
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    ingested: AtomicU64,
    forwarded: AtomicU64,
    filtered: AtomicU64,
    scrub_failures: AtomicU64,
    published: AtomicU64,
    spilled: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                ingested: AtomicU64::new(0),
                forwarded: AtomicU64::new(0),
                filtered: AtomicU64::new(0),
                scrub_failures: AtomicU64::new(0),
                published: AtomicU64::new(0),
                spilled: AtomicU64::new(0),
            }),
        }
    }

    /// Record an ingested raw record
    pub fn record_ingested(&self) {
        self.inner.ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event that passed the quality filter
    pub fn record_forwarded(&self) {
        self.inner.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event dropped by the quality filter or dedup window
    pub fn record_filtered(&self) {
        self.inner.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event dropped because scrubbing failed
    pub fn record_scrub_failure(&self) {
        self.inner.scrub_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful publish
    pub fn record_published(&self) {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event that landed in the spillover queue
    pub fn record_spilled(&self) {
        self.inner.spilled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingested: self.inner.ingested.load(Ordering::Relaxed),
            forwarded: self.inner.forwarded.load(Ordering::Relaxed),
            filtered: self.inner.filtered.load(Ordering::Relaxed),
            scrub_failures: self.inner.scrub_failures.load(Ordering::Relaxed),
            published: self.inner.published.load(Ordering::Relaxed),
            spilled: self.inner.spilled.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current audit metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub ingested: u64,
    pub forwarded: u64,
    pub filtered: u64,
    pub scrub_failures: u64,
    pub published: u64,
    pub spilled: u64,
}

impl MetricsSnapshot {
    /// Fraction of ingested events that were forwarded
    pub fn forward_rate(&self) -> f64 {
        if self.ingested == 0 {
            0.0
        } else {
            self.forwarded as f64 / self.ingested as f64
        }
    }
}
