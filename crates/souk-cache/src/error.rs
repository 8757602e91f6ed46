//! Error types for query cache operations.

/// Error type for query cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The fetcher failed to load the query.
    #[error("Fetch failed: {0}")]
    Fetch(String),
}

impl Error {
    /// Create a fetch error from anything displayable.
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        Error::Fetch(err.to_string())
    }
}

/// Result type for query cache operations.
pub type Result<T> = std::result::Result<T, Error>;
