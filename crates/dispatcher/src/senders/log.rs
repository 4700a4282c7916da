//! LogSender - logs group summaries via tracing

use std::sync::atomic::{AtomicBool, Ordering};

use contracts::{ContractError, DestinationKey, Message, SendError, Sender};
use tracing::{debug, info, instrument};

/// Sender that logs group summaries instead of delivering them
pub struct LogSender {
    name: String,
    connected: AtomicBool,
}

impl LogSender {
    /// Create a new LogSender with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(false),
        }
    }

    fn log_group_summary(&self, destination: &DestinationKey, messages: &[Message]) {
        let bytes: usize = messages.iter().map(Message::size).sum();
        let keyed = messages.iter().filter(|m| m.key.is_some()).count();

        info!(
            sender = %self.name,
            destination = %destination,
            messages = messages.len(),
            keyed,
            bytes,
            "Group delivered"
        );
    }
}

impl Sender for LogSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        format!("{}()", self.name)
    }

    #[instrument(name = "log_sender_connect", skip(self))]
    async fn connect(&self) -> Result<(), ContractError> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    #[instrument(
        name = "log_sender_send",
        skip(self, messages),
        fields(sender = %self.name, destination = %destination)
    )]
    async fn send(
        &self,
        destination: &DestinationKey,
        messages: &[Message],
    ) -> Result<(), SendError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SendError::NotConnected {
                destination: destination.to_string(),
            });
        }
        self.log_group_summary(destination, messages);
        Ok(())
    }

    #[instrument(name = "log_sender_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!(sender = %self.name, "LogSender closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::Event;
    use serde_json::json;

    fn message() -> Message {
        Message {
            destination: None,
            partition: None,
            key: Some(Bytes::from_static(b"k")),
            payload: Bytes::from_static(b"{}"),
            event: Event::from_value(json!({})).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_log_sender_send() {
        let sender = LogSender::new("test_log");
        sender.connect().await.unwrap();

        let result = sender.send(&"trace-a".into(), &[message()]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_log_sender_requires_connect() {
        let sender = LogSender::new("my_logger");
        assert_eq!(sender.name(), "my_logger");
        assert_eq!(sender.describe(), "my_logger()");

        let err = sender.send(&"trace-a".into(), &[message()]).await.unwrap_err();
        assert!(matches!(err, SendError::NotConnected { .. }));
    }
}
