//! MessageBuilder - one event in, one transport-ready message out

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use contracts::{Codec, DestinationKey, EncodeError, Event, KeyFormatter, Message};

/// Cache key holding a previously resolved destination
pub const TOPIC_CACHE_KEY: &str = "topic";

/// Cache key holding a partition hint
pub const PARTITION_CACHE_KEY: &str = "partition";

/// Builds messages from events
pub struct MessageBuilder {
    index: String,
    codec: Box<dyn Codec>,
    key: Option<Box<dyn KeyFormatter>>,
}

impl MessageBuilder {
    /// Create a builder without a message key
    pub fn new(index: &str, codec: Box<dyn Codec>) -> Self {
        Self {
            index: index.to_lowercase(),
            codec,
            key: None,
        }
    }

    /// Compute message keys with the given formatter
    pub fn with_key(mut self, key: Box<dyn KeyFormatter>) -> Self {
        self.key = Some(key);
        self
    }

    /// Build the message for one event
    ///
    /// # Errors
    /// Returns the codec's [`EncodeError`]; the caller drops the event.
    pub fn build(&self, event: &Event) -> Result<Message, EncodeError> {
        let partition = event
            .cache
            .get_value(PARTITION_CACHE_KEY)
            .and_then(Value::as_i64)
            .and_then(|p| i32::try_from(p).ok());

        let destination = event
            .cache
            .get_value(TOPIC_CACHE_KEY)
            .and_then(Value::as_str)
            .filter(|topic| !topic.is_empty())
            .map(DestinationKey::from);

        let payload = self.codec.encode(&self.index, event)?;

        let key = self.key.as_ref().and_then(|formatter| {
            match formatter.run_bytes(event) {
                Ok(key) => Some(Bytes::from(key)),
                Err(e) => {
                    debug!(error = %e, "Message key unavailable, sending without key");
                    None
                }
            }
        });

        Ok(Message {
            destination,
            partition,
            key,
            payload,
            event: event.clone(),
        })
    }
}
