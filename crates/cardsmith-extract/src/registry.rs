//! Format-to-extractor lookup.

use std::collections::HashMap;
use std::sync::Arc;

use cardsmith_types::DocumentFormat;

use crate::{DocxExtractor, ExtractError, PdfExtractor, Result, TextExtractor};

/// Registry of text extractors keyed by document format.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<DocumentFormat, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in PDF and DOCX extractors.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfExtractor::new());
        registry.register(DocxExtractor::new());
        registry
    }

    /// Register an extractor, replacing any existing one for its format.
    pub fn register<E: TextExtractor + 'static>(&mut self, extractor: E) {
        self.register_shared(Arc::new(extractor));
    }

    /// Register an already shared extractor.
    pub fn register_shared(&mut self, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(extractor.format(), extractor);
    }

    /// Get the extractor for a format.
    #[must_use]
    pub fn get(&self, format: DocumentFormat) -> Option<Arc<dyn TextExtractor>> {
        self.extractors.get(&format).cloned()
    }

    /// Check whether a format has an extractor.
    #[must_use]
    pub fn supports(&self, format: DocumentFormat) -> bool {
        self.extractors.contains_key(&format)
    }

    /// Extract text from a document of the given format.
    pub async fn extract(&self, format: DocumentFormat, bytes: &[u8]) -> Result<String> {
        let extractor = self.get(format).ok_or(ExtractError::Unsupported(format))?;
        extractor.extract(bytes).await
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("formats", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}
