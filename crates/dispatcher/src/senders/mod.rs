//! Sender implementations
//!
//! Contains RestSender, LogSender and FileSender, plus `AnySender` for
//! config-driven selection.

mod file;
mod log;
mod rest;

pub use self::file::{FileSender, FileSenderConfig};
pub use self::log::LogSender;
pub use self::rest::{RestSender, RestSenderConfig};

use contracts::{
    ContractError, DestinationKey, Message, PublisherConfig, SendError, Sender, SenderType,
};
use tracing::instrument;

use crate::error::DispatcherError;

/// Sender chosen at runtime from configuration
pub enum AnySender {
    Rest(RestSender),
    Log(LogSender),
    File(FileSender),
}

impl Sender for AnySender {
    fn name(&self) -> &str {
        match self {
            Self::Rest(s) => s.name(),
            Self::Log(s) => s.name(),
            Self::File(s) => s.name(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Rest(s) => s.describe(),
            Self::Log(s) => s.describe(),
            Self::File(s) => s.describe(),
        }
    }

    async fn connect(&self) -> Result<(), ContractError> {
        match self {
            Self::Rest(s) => s.connect().await,
            Self::Log(s) => s.connect().await,
            Self::File(s) => s.connect().await,
        }
    }

    async fn send(
        &self,
        destination: &DestinationKey,
        messages: &[Message],
    ) -> Result<(), SendError> {
        match self {
            Self::Rest(s) => s.send(destination, messages).await,
            Self::Log(s) => s.send(destination, messages).await,
            Self::File(s) => s.send(destination, messages).await,
        }
    }

    async fn close(&self) -> Result<(), ContractError> {
        match self {
            Self::Rest(s) => s.close().await,
            Self::Log(s) => s.close().await,
            Self::File(s) => s.close().await,
        }
    }
}

/// Create the configured sender (not yet connected)
#[instrument(
    name = "dispatcher_create_sender",
    skip(config),
    fields(sender_type = ?config.sender.sender_type)
)]
pub fn create_sender(config: &PublisherConfig) -> Result<AnySender, DispatcherError> {
    match config.sender.sender_type {
        SenderType::Rest => {
            let rest = RestSenderConfig::from_config(config)
                .map_err(|e| DispatcherError::sender_creation("kafka-rest", e))?;
            Ok(AnySender::Rest(RestSender::new("kafka-rest", rest)))
        }
        SenderType::Log => Ok(AnySender::Log(LogSender::new("log"))),
        SenderType::File => {
            let file = FileSenderConfig::from_params(&config.sender.params);
            Ok(AnySender::File(FileSender::new("file", file)))
        }
    }
}
