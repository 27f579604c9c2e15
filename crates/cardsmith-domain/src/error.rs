//! Domain error types.

use thiserror::Error;

/// Domain-level errors.
///
/// These are the failures that can happen before a generation stream opens.
/// Once streaming, failures become a terminal `StreamEvent::Error` instead.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Session id is unknown, consumed, or expired.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session is already being generated from.
    #[error("Session is busy: {0}")]
    SessionBusy(String),

    /// Session store refused a new upload.
    #[error("Session store is full (capacity {0})")]
    Capacity(usize),

    /// Session id could not be parsed.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Document text could not be extracted, or was empty.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The generation backend failed before streaming.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<cardsmith_session::Error> for DomainError {
    fn from(err: cardsmith_session::Error) -> Self {
        use cardsmith_session::Error;
        match err {
            Error::NotFound(id) => DomainError::SessionNotFound(id),
            Error::Busy(id) => DomainError::SessionBusy(id),
            Error::CapacityExceeded { capacity } => DomainError::Capacity(capacity),
            Error::InvalidId(id) => DomainError::InvalidSessionId(id),
        }
    }
}

impl From<cardsmith_extract::ExtractError> for DomainError {
    fn from(err: cardsmith_extract::ExtractError) -> Self {
        DomainError::Extraction(err.to_string())
    }
}

impl From<cardsmith_llm::LlmError> for DomainError {
    fn from(err: cardsmith_llm::LlmError) -> Self {
        DomainError::Generation(err.to_string())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
