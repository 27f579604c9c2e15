use cardsmith_types::DocumentFormat;

/// Error type for text extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// No extractor is registered for the format.
    #[error("No extractor registered for {0}")]
    Unsupported(DocumentFormat),

    /// The document could not be parsed.
    #[error("Failed to read {format} document: {message}")]
    Malformed {
        format: DocumentFormat,
        message: String,
    },

    /// The blocking extraction task failed to complete.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

impl ExtractError {
    pub(crate) fn malformed(format: DocumentFormat, message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            format,
            message: message.to_string(),
        }
    }
}

/// Result type for text extraction.
pub type Result<T> = std::result::Result<T, ExtractError>;
