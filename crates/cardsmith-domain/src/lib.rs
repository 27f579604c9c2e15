//! Domain layer for Cardsmith.
//!
//! Sits between the transports (HTTP server, CLI) and the infrastructure
//! crates and provides:
//!
//! - **Record extraction**: [`ExtractionCursor`] turns an arbitrarily
//!   fragmented stream of generated text into validated records, emitting
//!   each one as soon as its closing brace arrives.
//! - **Generation orchestration**: [`GenerationService`] claims an upload
//!   session, extracts the document text, prompts the model and forwards the
//!   resulting [`StreamEvent`]s in order.
//!
//! # Example
//!
//! ```ignore
//! use cardsmith_domain::GenerationService;
//!
//! let service = GenerationService::new(sessions, extractors, backend);
//! let mut events = service.generate(&session_id).await?;
//! while let Some(event) = events.next().await {
//!     println!("{}: {}", event.name(), event.payload());
//! }
//! ```

mod error;
pub mod prompt;
pub mod records;
pub mod services;

pub use error::{DomainError, Result};
pub use records::{ExtractionCursor, Record, RecordParseError, extract_all, record_events};
pub use services::generation::{
    DEFAULT_MODEL, EventStream, GenerationOptions, GenerationService, PreparedGeneration,
};

pub use cardsmith_types::{Flashcard, StreamEvent};
