//! Codec and key formatter traits consumed by the message builder

use bytes::Bytes;

use crate::{EncodeError, Event, FormatError};

/// Event serializer
pub trait Codec: Send + Sync {
    /// Serialize an event. `index` is a hint written into the payload metadata.
    ///
    /// # Errors
    /// Returns [`EncodeError`] when the event cannot be serialized; the event is dropped.
    fn encode(&self, index: &str, event: &Event) -> Result<Bytes, EncodeError>;
}

/// Message key expression
pub trait KeyFormatter: Send + Sync {
    /// Render the key for one event.
    ///
    /// # Errors
    /// Returns [`FormatError`] when the key cannot be rendered.
    fn run_bytes(&self, event: &Event) -> Result<Vec<u8>, FormatError>;
}
