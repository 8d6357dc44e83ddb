//! Error types for store operations

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a store backend.
///
/// Ownership conflicts are never errors; they come back as ordinary script
/// replies. Everything here means the store could not answer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection refused, dropped or otherwise unusable
    #[error("connection error: {0}")]
    Connection(String),

    /// No response within the configured timeout
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// Script failed to load or raised during evaluation
    #[error("script error: {0}")]
    Script(String),

    /// Reply shape the caller cannot interpret
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Backend cannot execute this script
    #[error("unsupported script: {0}")]
    UnsupportedScript(String),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the failure is a transport problem rather than a rejected command
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Timeout(_))
    }
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error()
        {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}
