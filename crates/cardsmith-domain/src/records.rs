//! Incremental record extraction from streamed model output.
//!
//! Models are asked for a JSON array of records but routinely wrap it in an
//! object, surround it with prose or code fences, or stream it in fragments
//! that split anywhere, including inside strings and escape sequences. The
//! [`ExtractionCursor`] does not parse the document as a whole. It tokenises
//! just enough structure to find brace-delimited objects and hands each
//! completed candidate to serde.
//!
//! Candidates are:
//!
//! - every *leaf* object (one that contains no nested object), and
//! - a container object, only if no record was emitted from inside it.
//!
//! A wrapper such as `{"flashcards": [...]}` therefore never yields a record
//! itself, while a record carrying a nested value (`{"question": .., "answer":
//! .., "meta": {..}}`) is still recognised once its own closing brace arrives.
//! Because a span that produced a record is never nested inside another
//! candidate that is tried, every record is emitted exactly once.
//!
//! A malformed candidate with an unterminated string would otherwise swallow
//! the rest of the stream as string content. The cursor detects the broken
//! quote parity and rescans from just past the offending object's brace.

use std::marker::PhantomData;

use cardsmith_types::{Flashcard, StreamEvent};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// A value that can be recognised in generated text.
pub trait Record: DeserializeOwned {
    /// Check field-level constraints serde cannot express.
    fn validate(&self) -> std::result::Result<(), String>;
}

impl Record for Flashcard {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.question.is_empty() {
            return Err("question is empty".to_string());
        }
        if self.answer.is_empty() {
            return Err("answer is empty".to_string());
        }
        Ok(())
    }
}

/// A candidate span that did not yield a record.
///
/// Never propagated: the span is skipped and extraction continues.
#[derive(Debug, thiserror::Error)]
pub enum RecordParseError {
    /// The span is not valid JSON for the record shape.
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The span parsed but failed validation.
    #[error("invalid record: {0}")]
    Invalid(String),
}

/// Parse and validate a single candidate span.
pub fn parse_record<T: Record>(span: &str) -> std::result::Result<T, RecordParseError> {
    let record: T = serde_json::from_str(span)?;
    record.validate().map_err(RecordParseError::Invalid)?;
    Ok(record)
}

// ─────────────────────────────────────────────────────────────────────────────
// Cursor
// ─────────────────────────────────────────────────────────────────────────────

/// An object whose closing brace has not arrived yet.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Stream offset of the opening brace.
    start: usize,
    /// Whether a nested object has opened inside this one.
    has_child: bool,
    /// Records emitted before this object opened.
    emitted_at_open: usize,
}

impl Frame {
    /// Whether this object may still become a record when it closes.
    fn is_candidate(&self, emitted: usize) -> bool {
        self.emitted_at_open == emitted
    }
}

/// Per-stream state for incremental record extraction.
///
/// Feed fragments in generation order with [`push`](Self::push). Each call
/// scans only text it has not seen before and returns the records completed
/// by that fragment, in the order their closing braces appear.
///
/// Quote parity inside an object is checked as it goes: in valid JSON a
/// closing quote is followed by `:`, `,`, `}` or `]`. Anything else means an
/// earlier string was never terminated, so every open object is abandoned
/// and scanning resumes just past the innermost one's opening brace. Text
/// that already produced a record is never rescanned.
///
/// All offsets are absolute positions in the stream; `base` is the offset of
/// the first byte still held in `buffer`.
#[derive(Debug)]
pub struct ExtractionCursor<T> {
    buffer: String,
    base: usize,
    /// Everything before this offset has been tokenised.
    scanned: usize,
    /// End of the last emitted record. Rescans never start before it.
    floor: usize,
    /// Open objects, outermost first.
    frames: Vec<Frame>,
    in_string: bool,
    escaped: bool,
    /// A string just closed and no significant byte has followed yet.
    after_string: bool,
    emitted: usize,
    rejected: usize,
    resyncs: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Default for ExtractionCursor<T> {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            base: 0,
            scanned: 0,
            floor: 0,
            frames: Vec::new(),
            in_string: false,
            escaped: false,
            after_string: false,
            emitted: 0,
            rejected: 0,
            resyncs: 0,
            _record: PhantomData,
        }
    }
}

impl<T: Record> ExtractionCursor<T> {
    /// Create an empty cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the records it completes.
    pub fn push(&mut self, fragment: &str) -> Vec<T> {
        self.buffer.push_str(fragment);

        let mut records = Vec::new();
        let mut pos = self.scanned;
        let end = self.base + self.buffer.len();

        // Structural bytes are all ASCII, so scanning bytes never splits a
        // multi-byte character in a way that matters.
        while pos < end {
            let byte = self.buffer.as_bytes()[pos - self.base];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    self.after_string = true;
                }
                pos += 1;
                continue;
            }

            if self.after_string && !byte.is_ascii_whitespace() {
                self.after_string = false;
                if !matches!(byte, b':' | b',' | b'}' | b']') {
                    pos = self.resync(pos);
                    continue;
                }
            }

            match byte {
                // Quotes only delimit strings inside an object; prose around
                // the JSON may contain unbalanced quotes.
                b'"' if !self.frames.is_empty() => self.in_string = true,
                b'{' => {
                    if let Some(parent) = self.frames.last_mut() {
                        parent.has_child = true;
                    }
                    self.frames.push(Frame {
                        start: pos,
                        has_child: false,
                        emitted_at_open: self.emitted,
                    });
                }
                b'}' => {
                    if let Some(frame) = self.frames.pop()
                        && (!frame.has_child || frame.is_candidate(self.emitted))
                    {
                        let span = &self.buffer[frame.start - self.base..=pos - self.base];
                        match parse_record::<T>(span) {
                            Ok(record) => {
                                self.emitted += 1;
                                self.floor = pos + 1;
                                records.push(record);
                            }
                            Err(e) => {
                                self.rejected += 1;
                                debug!(error = %e, span_len = span.len(), "Skipping candidate record");
                            }
                        }
                    }
                }
                _ => {}
            }

            pos += 1;
        }

        self.scanned = pos;
        self.compact();
        records
    }

    /// Abandon all open objects after a quote-parity violation at `pos`.
    ///
    /// Returns the offset to resume scanning from, which is always past the
    /// previous resume point, so repeated violations still make progress.
    fn resync(&mut self, pos: usize) -> usize {
        let innermost = self.frames.last().map_or(pos, |f| f.start);
        let resume = (innermost + 1).max(self.floor).max(self.base);

        self.resyncs += 1;
        debug!(at = pos, resume, open = self.frames.len(), "Unterminated string; rescanning");

        self.frames.clear();
        self.in_string = false;
        self.escaped = false;
        self.after_string = false;
        resume
    }

    /// Drop text that can no longer be part of a candidate or a rescan.
    fn compact(&mut self) {
        let keep_from = match self.frames.last() {
            None => self.scanned,
            Some(innermost) => self
                .frames
                .iter()
                .find(|f| f.is_candidate(self.emitted))
                .map_or(innermost.start.max(self.floor), |f| f.start),
        }
        .max(self.base);

        let dropped = keep_from - self.base;
        if dropped == 0 {
            return;
        }

        trace!(dropped, kept = self.buffer.len() - dropped, "Compacting extraction buffer");

        self.buffer.drain(..dropped);
        self.base = keep_from;
    }

    /// Number of records emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Number of candidate spans skipped so far.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Number of times an unterminated string forced a rescan.
    pub fn resyncs(&self) -> usize {
        self.resyncs
    }

    /// Bytes currently held in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether an object is still open at the current position.
    pub fn has_partial(&self) -> bool {
        !self.frames.is_empty()
    }
}

/// Extract every record from a complete text.
pub fn extract_all<T: Record>(text: &str) -> Vec<T> {
    ExtractionCursor::new().push(text)
}

// ─────────────────────────────────────────────────────────────────────────────
// Event stream
// ─────────────────────────────────────────────────────────────────────────────

/// Drive a fragment stream through a cursor and emit events.
///
/// Yields one `Flashcard` event per record as soon as it completes, then
/// `Complete { count }` when the fragments end normally. An upstream error
/// yields a terminal `Error` event; records already yielded stand. Partial
/// content left at the end is discarded.
pub fn record_events<S, E>(fragments: S) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = std::result::Result<String, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut cursor = ExtractionCursor::<Flashcard>::new();
        futures::pin_mut!(fragments);

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    for card in cursor.push(&fragment) {
                        yield StreamEvent::Flashcard(card);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    debug!(
                        error = %message,
                        emitted = cursor.emitted(),
                        "Fragment stream failed"
                    );
                    yield StreamEvent::Error { message };
                    return;
                }
            }
        }

        if cursor.has_partial() {
            debug!(discarded = cursor.buffered(), "Discarding trailing partial content");
        }

        yield StreamEvent::Complete { count: cursor.emitted() };
    }
}
