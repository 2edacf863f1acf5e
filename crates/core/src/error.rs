// Error types shared by the chat server and client

use thiserror::Error;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur while recording, querying or delivering chat events
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required field is missing or malformed; nothing was recorded
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The responder failed to produce a reply
    #[error("Responder error: {0}")]
    Responder(String),

    /// Stream or network transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        ChatError::NotFound(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        ChatError::Storage(msg.into())
    }

    /// Create a responder error
    pub fn responder(msg: impl Into<String>) -> Self {
        ChatError::Responder(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        ChatError::Transport(msg.into())
    }

    /// Whether the error is the caller's fault (maps to a 4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::NotFound(_))
    }
}
