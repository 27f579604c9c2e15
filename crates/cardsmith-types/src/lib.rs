//! Shared types for the Cardsmith flashcard service.

pub mod document;
pub mod event;

pub use document::DocumentFormat;
pub use event::{Flashcard, StreamEvent};
