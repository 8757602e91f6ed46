//! Error types for chat synchronization.

/// Error type for chat operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The remote gateway rejected or failed a request.
    #[error("Gateway error: {0}")]
    Gateway(#[from] souk_client::Error),

    /// A cached query could not be loaded.
    #[error("Query error: {0}")]
    Query(#[from] souk_cache::Error),

    /// Outbound message has no content after trimming.
    #[error("Message is empty")]
    EmptyMessage,

    /// Nothing to send into: no conversation is active or pending.
    #[error("No active conversation")]
    NoActiveConversation,

    /// The conversation is not in the loaded list.
    #[error("Conversation not found: {0}")]
    UnknownConversation(String),

    /// Persisted key/value storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The push channel URL cannot be used.
    #[error("Invalid push URL: {0}")]
    InvalidPushUrl(String),
}

impl ChatError {
    /// Whether the operation may succeed if retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Gateway(e) => e.is_transient(),
            ChatError::Query(_) => true,
            _ => false,
        }
    }
}

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
