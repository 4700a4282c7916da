//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Sender could not be connected
    #[error("Failed to connect sender {sender}: {message}")]
    SenderConnection { sender: String, message: String },

    /// Input could not be opened
    #[error("Failed to open input {path}: {message}")]
    InputOpen { path: String, message: String },

    /// Pipeline execution error
    #[error("Pipeline execution failed: {message}")]
    PipelineExecution { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn sender_connection(sender: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SenderConnection {
            sender: sender.into(),
            message: message.into(),
        }
    }

    pub fn input_open(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InputOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn pipeline_execution(message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            message: message.into(),
        }
    }
}
