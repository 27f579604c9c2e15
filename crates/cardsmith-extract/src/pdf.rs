//! PDF text extraction.

use async_trait::async_trait;
use cardsmith_types::DocumentFormat;
use tracing::debug;

use crate::{ExtractError, Result, TextExtractor};

/// Extractor for PDF documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    /// Create a new PDF extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        debug!(bytes = bytes.len(), "Extracting PDF text");

        // CPU bound, and pdf-extract may panic on malformed input.
        let owned = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
            .map_err(|e| ExtractError::malformed(DocumentFormat::Pdf, e))?;

        let text = normalize(&text);
        debug!(chars = text.chars().count(), "PDF text extracted");
        Ok(text)
    }
}

/// Trim trailing whitespace per line and collapse runs of blank lines.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}
