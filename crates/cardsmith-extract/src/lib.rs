//! Plain-text extraction from uploaded documents.
//!
//! Each supported [`DocumentFormat`] has a [`TextExtractor`]. The
//! [`ExtractorRegistry`] maps formats to extractors so callers can stay
//! format-agnostic.

mod docx;
mod error;
mod pdf;
mod registry;

pub use docx::DocxExtractor;
pub use error::{ExtractError, Result};
pub use pdf::PdfExtractor;
pub use registry::ExtractorRegistry;

use async_trait::async_trait;
use cardsmith_types::DocumentFormat;

/// Turns raw document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// The format this extractor reads.
    fn format(&self) -> DocumentFormat;

    /// Extract the document's text.
    ///
    /// The result may be empty or whitespace-only when the document has no
    /// text layer; callers decide whether that is an error.
    async fn extract(&self, bytes: &[u8]) -> Result<String>;
}
