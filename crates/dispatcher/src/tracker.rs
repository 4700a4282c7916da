//! DeliveryTracker - resolves one batch from many partial outcomes
//!
//! Invariants:
//! - Every event of the batch is reported exactly once (drop, success or failure)
//! - The batch is resolved by whichever caller moves `remaining` to zero
//! - Only retryable failures set the recorded error

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info};

use contracts::{Batch, Event, Observer, SendError};

#[derive(Default)]
struct Failures {
    events: Vec<Event>,
    last_error: Option<SendError>,
}

/// Outcome accumulator for one publish attempt
///
/// All methods take `&self` and may be called concurrently from any task.
pub struct DeliveryTracker {
    total: usize,
    remaining: AtomicUsize,
    dropped: AtomicUsize,
    failures: Mutex<Failures>,
    batch: Mutex<Option<Box<dyn Batch>>>,
    observer: Arc<dyn Observer>,
}

impl DeliveryTracker {
    /// Start tracking a batch. An empty batch is acked immediately.
    pub fn new(batch: Box<dyn Batch>, observer: Arc<dyn Observer>) -> Arc<Self> {
        let total = batch.events().len();
        let tracker = Arc::new(Self {
            total,
            remaining: AtomicUsize::new(total),
            dropped: AtomicUsize::new(0),
            failures: Mutex::new(Failures::default()),
            batch: Mutex::new(Some(batch)),
            observer,
        });

        if total == 0 {
            tracker.resolve();
        }
        tracker
    }

    /// Number of events in the batch
    pub fn total(&self) -> usize {
        self.total
    }

    /// Events not yet reported
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Whether the batch has been acked or handed back
    pub fn is_resolved(&self) -> bool {
        lock(&self.batch).is_none()
    }

    /// `n` events were dropped before sending. The caller emits the metric.
    pub fn dropped(&self, n: usize) {
        self.dropped.fetch_add(n, Ordering::AcqRel);
        self.dec(n);
    }

    /// `n` events were delivered
    pub fn succeeded(&self, n: usize) {
        self.dec(n);
    }

    /// A group of events failed
    ///
    /// Unretryable failures drop the events; retryable ones queue them for retry
    /// and record the error.
    pub fn failed(&self, events: Vec<Event>, err: SendError) {
        let n = events.len();

        if err.is_retryable() {
            let mut failures = lock(&self.failures);
            failures.events.extend(events);
            failures.last_error = Some(err);
        } else {
            error!(
                destination = err.destination(),
                events = n,
                error = %err,
                "Dropping events refused by destination"
            );
            self.observer.dropped(n);
            self.dropped.fetch_add(n, Ordering::AcqRel);
        }

        self.dec(n);
    }

    /// Report the outcome of one group send
    pub fn record(&self, events: Vec<Event>, result: Result<(), SendError>) {
        match result {
            Ok(()) => self.succeeded(events.len()),
            Err(err) => self.failed(events, err),
        }
    }

    fn dec(&self, n: usize) {
        if n == 0 {
            return;
        }

        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(n))
        {
            Ok(previous) if previous == n => self.resolve(),
            Ok(_) => {}
            Err(remaining) => {
                error!(
                    remaining,
                    reported = n,
                    "Outcome reported for more events than outstanding"
                );
            }
        }
    }

    fn resolve(&self) {
        let Some(batch) = lock(&self.batch).take() else {
            error!("Batch already resolved");
            return;
        };

        let Failures {
            events: failed,
            last_error,
        } = std::mem::take(&mut *lock(&self.failures));
        let dropped = self.dropped.load(Ordering::Acquire);

        match last_error {
            Some(err) => {
                let failed_count = failed.len();
                let acked = self.total.saturating_sub(dropped + failed_count);
                // Counts are visible before the batch owner sees the outcome
                self.observer.failed(failed_count);
                self.observer.acked(acked);
                batch.retry_events(failed);
                info!(
                    total = self.total,
                    acked,
                    failed = failed_count,
                    dropped,
                    error = %err,
                    "Publish failed, events handed back for retry"
                );
            }
            None => {
                let acked = self.total.saturating_sub(dropped);
                self.observer.acked(acked);
                batch.ack();
                info!(total = self.total, acked, dropped, "Finished batch");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchOutcome, ChannelBatch};
    use crate::metrics::PublishMetrics;
    use contracts::UnretryableReason;
    use serde_json::json;

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::from_value(json!({ "seq": i })).unwrap())
            .collect()
    }

    fn tracker(n: usize) -> (
        Arc<DeliveryTracker>,
        tokio::sync::oneshot::Receiver<BatchOutcome>,
        Arc<PublishMetrics>,
    ) {
        let (batch, rx) = ChannelBatch::new(events(n));
        let metrics = Arc::new(PublishMetrics::new());
        let tracker = DeliveryTracker::new(Box::new(batch), metrics.clone());
        (tracker, rx, metrics)
    }

    #[test]
    fn test_empty_batch_acks_immediately() {
        let (tracker, mut rx, metrics) = tracker(0);
        assert!(tracker.is_resolved());
        assert_eq!(rx.try_recv().unwrap(), BatchOutcome::Acked);
        assert_eq!(metrics.snapshot().acked, 0);
    }

    #[test]
    fn test_all_success_acks() {
        let (tracker, mut rx, metrics) = tracker(3);
        tracker.dropped(1);
        assert!(!tracker.is_resolved());
        tracker.succeeded(2);

        assert!(tracker.is_resolved());
        assert_eq!(rx.try_recv().unwrap(), BatchOutcome::Acked);
        let snap = metrics.snapshot();
        assert_eq!(snap.acked, 2);
        assert_eq!(snap.failed, 0);
    }

    #[test]
    fn test_retryable_failure_retries_group() {
        let (tracker, mut rx, metrics) = tracker(4);
        let failed = events(2);
        tracker.succeeded(2);
        tracker.failed(failed.clone(), SendError::retryable("trace-a", "503"));

        assert_eq!(rx.try_recv().unwrap(), BatchOutcome::Retry(failed));
        let snap = metrics.snapshot();
        assert_eq!(snap.acked, 2);
        assert_eq!(snap.failed, 2);
    }

    #[test]
    fn test_unretryable_does_not_clear_retryable_error() {
        let (tracker, mut rx, metrics) = tracker(3);
        let retried = events(1);
        tracker.failed(retried.clone(), SendError::retryable("trace-a", "timeout"));
        tracker.failed(
            events(2),
            SendError::unretryable("trace-b", UnretryableReason::MessageTooLarge, "413"),
        );

        assert_eq!(rx.try_recv().unwrap(), BatchOutcome::Retry(retried));
        let snap = metrics.snapshot();
        assert_eq!(snap.dropped, 2);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.acked, 0);
    }

    #[test]
    fn test_unretryable_only_acks() {
        let (tracker, mut rx, metrics) = tracker(2);
        tracker.failed(
            events(2),
            SendError::unretryable("trace-a", UnretryableReason::InvalidMessage, "400"),
        );

        assert_eq!(rx.try_recv().unwrap(), BatchOutcome::Acked);
        assert_eq!(metrics.snapshot().dropped, 2);
        assert_eq!(metrics.snapshot().acked, 0);
    }

    #[test]
    fn test_over_report_is_ignored() {
        let (tracker, mut rx, _metrics) = tracker(1);
        tracker.succeeded(2);
        assert!(!tracker.is_resolved());
        assert!(rx.try_recv().is_err());
        tracker.succeeded(1);
        assert_eq!(rx.try_recv().unwrap(), BatchOutcome::Acked);
    }

    #[test]
    fn test_concurrent_reports_resolve_once() {
        const THREADS: usize = 16;
        const PER_THREAD: usize = 250;

        let (batch, mut rx) = ChannelBatch::new(events(THREADS * PER_THREAD));
        let metrics = Arc::new(PublishMetrics::new());
        let tracker = DeliveryTracker::new(Box::new(batch), metrics.clone());

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        if t % 2 == 0 && i % 5 == 0 {
                            let event = Event::from_value(json!({ "t": t, "i": i })).unwrap();
                            tracker.failed(vec![event], SendError::retryable("trace-x", "flaky"));
                        } else {
                            tracker.succeeded(1);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let BatchOutcome::Retry(retried) = rx.try_recv().unwrap() else {
            panic!("expected retry");
        };
        let expected_failed = (THREADS / 2) * (PER_THREAD / 5);
        assert_eq!(retried.len(), expected_failed);

        let snap = metrics.snapshot();
        assert_eq!(snap.failed as usize, expected_failed);
        assert_eq!(snap.acked as usize, THREADS * PER_THREAD - expected_failed);
        assert_eq!(tracker.remaining(), 0);
    }
}
