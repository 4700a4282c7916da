//! Dispatcher error types

use thiserror::Error;

use contracts::{ContractError, SendError};

/// Dispatcher-specific errors
///
/// Returned by `publish` as a diagnostic only: by then the batch has already
/// been resolved by its tracker.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sender creation error
    #[error("failed to create sender '{name}': {message}")]
    SenderCreation { name: String, message: String },

    /// A destination group failed
    #[error("group send error: {0}")]
    Send(#[from] SendError),

    /// A group task ended without completing normally
    #[error("group task aborted: {message}")]
    GroupTask { message: String },

    /// Contract error (config, lifecycle)
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

impl DispatcherError {
    /// Create a sender creation error
    pub fn sender_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SenderCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The send error behind this failure, if any
    pub fn send_error(&self) -> Option<&SendError> {
        match self {
            Self::Send(err) => Some(err),
            _ => None,
        }
    }
}
