//! Publish metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::Observer;

/// In-process publish counters
#[derive(Debug, Default)]
pub struct PublishMetrics {
    /// Batches received
    batches: AtomicU64,
    /// Events received
    events: AtomicU64,
    /// Events delivered
    acked: AtomicU64,
    /// Events handed back for retry
    failed: AtomicU64,
    /// Events dropped for good
    dropped: AtomicU64,
}

impl PublishMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get batch count
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Get acked count
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Get failed count
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Get dropped count
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.batches(),
            events: self.events.load(Ordering::Relaxed),
            acked: self.acked(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }
}

impl Observer for PublishMetrics {
    fn new_batch(&self, n: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn acked(&self, n: usize) {
        self.acked.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn failed(&self, n: usize) {
        self.failed.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Snapshot of publish metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches: u64,
    pub events: u64,
    pub acked: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Forwards every count to several observers
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn Observer>>,
}

impl FanoutObserver {
    /// Add another observer
    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl Observer for FanoutObserver {
    fn new_batch(&self, n: usize) {
        self.observers.iter().for_each(|o| o.new_batch(n));
    }

    fn dropped(&self, n: usize) {
        self.observers.iter().for_each(|o| o.dropped(n));
    }

    fn acked(&self, n: usize) {
        self.observers.iter().for_each(|o| o.acked(n));
    }

    fn failed(&self, n: usize) {
        self.observers.iter().for_each(|o| o.failed(n));
    }

    fn group_sent(&self, destination: &str, events: usize, ok: bool) {
        self.observers
            .iter()
            .for_each(|o| o.group_sent(destination, events, ok));
    }

    fn excluded(&self, reason: &str) {
        self.observers.iter().for_each(|o| o.excluded(reason));
    }
}
