//! Batch trait - unit of events resolved together
//!
//! Both resolution methods consume the batch, so a batch can be resolved at most once.

use crate::Event;

/// Ordered events awaiting a single ack-or-retry resolution
pub trait Batch: Send {
    /// Events in capture order
    fn events(&self) -> &[Event];

    /// All events were delivered (or intentionally dropped)
    fn ack(self: Box<Self>);

    /// Redeliver the given subset later
    fn retry_events(self: Box<Self>, events: Vec<Event>);
}
