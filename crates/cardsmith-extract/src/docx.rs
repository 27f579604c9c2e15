//! DOCX text extraction.
//!
//! A DOCX file is a zip archive; the body text lives in `word/document.xml`
//! as runs of `<w:t>` elements grouped into `<w:p>` paragraphs.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use cardsmith_types::DocumentFormat;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::{ExtractError, Result, TextExtractor};

const DOCUMENT_PART: &str = "word/document.xml";

/// Extractor for DOCX documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxExtractor;

impl DocxExtractor {
    /// Create a new DOCX extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for DocxExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        debug!(bytes = bytes.len(), "Extracting DOCX text");

        let owned = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || extract_docx_text(&owned))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))??;

        debug!(chars = text.chars().count(), "DOCX text extracted");
        Ok(text)
    }
}

fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::malformed(DocumentFormat::Docx, e))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ExtractError::malformed(DocumentFormat::Docx, format!("{DOCUMENT_PART}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::malformed(DocumentFormat::Docx, e))?;

    paragraphs_from_xml(&xml)
}

/// Collect the text of every paragraph, one paragraph per line.
fn paragraphs_from_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractError::malformed(DocumentFormat::Docx, e))?;

        match event {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let paragraph = std::mem::take(&mut current);
                    let trimmed = paragraph.trim();
                    if !trimmed.is_empty() {
                        paragraphs.push(trimmed.to_string());
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractError::malformed(DocumentFormat::Docx, e))?;
                current.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Text outside any closed paragraph.
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }

    Ok(paragraphs.join("\n"))
}
