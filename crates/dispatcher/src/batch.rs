//! ChannelBatch - in-memory batch resolved through a oneshot channel

use tokio::sync::oneshot;

use contracts::{Batch, Event};

/// How a batch was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every event delivered or intentionally dropped
    Acked,
    /// These events must be published again
    Retry(Vec<Event>),
}

/// Batch whose resolution is delivered to a receiver
pub struct ChannelBatch {
    events: Vec<Event>,
    tx: oneshot::Sender<BatchOutcome>,
}

impl ChannelBatch {
    /// Create a batch and the receiver of its outcome
    pub fn new(events: Vec<Event>) -> (Self, oneshot::Receiver<BatchOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { events, tx }, rx)
    }

    fn resolve(self, outcome: BatchOutcome) {
        // Receiver may be gone if the producer stopped waiting
        let _ = self.tx.send(outcome);
    }
}

impl Batch for ChannelBatch {
    fn events(&self) -> &[Event] {
        &self.events
    }

    fn ack(self: Box<Self>) {
        self.resolve(BatchOutcome::Acked);
    }

    fn retry_events(self: Box<Self>, events: Vec<Event>) {
        self.resolve(BatchOutcome::Retry(events));
    }
}
