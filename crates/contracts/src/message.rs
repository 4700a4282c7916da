//! Message - transport-ready form of one event, alive for one publish attempt

use bytes::Bytes;

use crate::{DestinationKey, Event};

/// Transformed event
#[derive(Debug, Clone)]
pub struct Message {
    /// Destination resolved by an earlier attempt, if cached on the event
    pub destination: Option<DestinationKey>,
    /// Partition hint cached on the event
    pub partition: Option<i32>,
    /// Optional message key
    pub key: Option<Bytes>,
    /// Serialized content
    pub payload: Bytes,
    /// Source event, handed back on retry
    pub event: Event,
}

impl Message {
    /// Key plus payload bytes
    pub fn size(&self) -> usize {
        self.key.as_ref().map_or(0, Bytes::len) + self.payload.len()
    }
}
