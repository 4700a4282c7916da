//! Layered error definitions
//!
//! Categorized by scope: config / sender lifecycle (batch-wide), encode / format (per event),
//! send (per destination group).

use std::fmt;

use thiserror::Error;

/// Unified error type for configuration and lifecycle failures
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sender Errors =====
    /// Sender connection error
    #[error("sender '{sender_name}' connection error: {message}")]
    SenderConnection {
        sender_name: String,
        message: String,
    },

    // ===== Event Errors =====
    /// Event could not be built from its raw representation
    #[error("invalid event: {message}")]
    InvalidEvent { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sender connection error
    pub fn sender_connection(sender_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SenderConnection {
            sender_name: sender_name.into(),
            message: message.into(),
        }
    }

    /// Create invalid event error
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }
}

/// Serialization failure of a single event. The event is dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to encode event for index '{index}': {message}")]
pub struct EncodeError {
    pub index: String,
    pub message: String,
}

impl EncodeError {
    pub fn new(index: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            message: message.into(),
        }
    }
}

/// Key format failure. Never fatal: the message proceeds without a key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Format string could not be parsed
    #[error("format string syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Referenced field is absent and no default was given
    #[error("field '{path}' not found in event")]
    MissingField { path: String },
}

/// Why a destination refused a group for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnretryableReason {
    /// Payload rejected as malformed
    InvalidMessage,
    /// Payload exceeds the destination size limit
    MessageTooLarge,
}

impl UnretryableReason {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid_message",
            Self::MessageTooLarge => "message_too_large",
        }
    }
}

impl fmt::Display for UnretryableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed destination group send
///
/// Everything except [`SendError::Unretryable`] sends the group's events back
/// through the batch retry path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// Transient or transport failure
    #[error("send to '{destination}' failed: {message}")]
    Retryable {
        destination: String,
        message: String,
    },

    /// Poison payload; the group is dropped and never retried
    #[error("destination '{destination}' refused group ({reason}): {message}")]
    Unretryable {
        destination: String,
        reason: UnretryableReason,
        message: String,
    },

    /// Publish was cancelled before the group completed
    #[error("send to '{destination}' cancelled")]
    Cancelled { destination: String },

    /// Group did not complete before the request deadline
    #[error("send to '{destination}' timed out after {timeout_ms}ms")]
    Timeout { destination: String, timeout_ms: u64 },

    /// Sender has no live connection (not connected yet, or closed)
    #[error("sender is not connected, cannot send to '{destination}'")]
    NotConnected { destination: String },
}

impl SendError {
    /// Create retryable error
    pub fn retryable(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retryable {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create unretryable error
    pub fn unretryable(
        destination: impl Into<String>,
        reason: UnretryableReason,
        message: impl Into<String>,
    ) -> Self {
        Self::Unretryable {
            destination: destination.into(),
            reason,
            message: message.into(),
        }
    }

    /// Whether the affected events go back through the retry path
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unretryable { .. })
    }

    /// Destination the failed group was addressed to
    pub fn destination(&self) -> &str {
        match self {
            Self::Retryable { destination, .. }
            | Self::Unretryable { destination, .. }
            | Self::Cancelled { destination }
            | Self::Timeout { destination, .. }
            | Self::NotConnected { destination } => destination,
        }
    }
}
