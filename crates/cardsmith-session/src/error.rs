//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session was never stored, was consumed, or has expired.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Session is already claimed by an in-flight generation.
    #[error("Session is busy: {0}")]
    Busy(String),

    /// Store is full and the capacity policy refused the upload.
    #[error("Session store is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// Session id could not be parsed.
    #[error("Invalid session id: {0}")]
    InvalidId(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
