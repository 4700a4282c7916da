//! Observer trait - publish outcome counters

use std::sync::Arc;

/// Receives per-batch delivery counts
pub trait Observer: Send + Sync {
    /// A batch of `n` events entered the publisher
    fn new_batch(&self, n: usize);

    /// `n` events were dropped and will never be retried
    fn dropped(&self, n: usize);

    /// `n` events were delivered
    fn acked(&self, n: usize);

    /// `n` events were handed back for retry
    fn failed(&self, n: usize);

    /// One destination group finished sending
    fn group_sent(&self, _destination: &str, _events: usize, _ok: bool) {}

    /// One event matched no route; `reason` is a stable label
    fn excluded(&self, _reason: &str) {}
}

/// Observer that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NilObserver;

impl Observer for NilObserver {
    fn new_batch(&self, _n: usize) {}
    fn dropped(&self, _n: usize) {}
    fn acked(&self, _n: usize) {}
    fn failed(&self, _n: usize) {}
}

impl<T: Observer + ?Sized> Observer for Arc<T> {
    fn new_batch(&self, n: usize) {
        (**self).new_batch(n);
    }

    fn dropped(&self, n: usize) {
        (**self).dropped(n);
    }

    fn acked(&self, n: usize) {
        (**self).acked(n);
    }

    fn failed(&self, n: usize) {
        (**self).failed(n);
    }

    fn group_sent(&self, destination: &str, events: usize, ok: bool) {
        (**self).group_sent(destination, events, ok);
    }

    fn excluded(&self, reason: &str) {
        (**self).excluded(reason);
    }
}
