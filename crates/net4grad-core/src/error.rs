//! Error types shared by the chat client.

use thiserror::Error;

/// Errors raised by chat operations.
///
/// Every variant is scoped to the single operation that produced it. None of
/// them is fatal to the client: the caller reports the message and the user
/// re-triggers the action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Failed to {operation}: {reason}")]
    FetchFailed { operation: String, reason: String },

    #[error("No open connection to the chat server")]
    SocketUnavailable,

    #[error("{0}")]
    ValidationFailed(String),

    #[error("Failed to connect to chat server: {0}")]
    Connect(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub fn fetch(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::FetchFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    /// Short, user-facing text for the error banner.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::FetchFailed { operation, .. } => format!("Failed to {operation}"),
            ChatError::SocketUnavailable => "Not connected to chat server".to_string(),
            ChatError::ValidationFailed(msg) => msg.clone(),
            ChatError::Connect(_) => "Failed to connect to chat server".to_string(),
            ChatError::Config(msg) => msg.clone(),
        }
    }
}
