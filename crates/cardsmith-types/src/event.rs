//! Records and the events that carry them to clients.

use serde::{Deserialize, Serialize};

/// A question/answer pair extracted from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

impl Flashcard {
    /// Create a new flashcard.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Event emitted over a generation stream.
///
/// `Complete` and `Error` are terminal: nothing follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The stream is open.
    Connected { session_id: String },
    /// A record was recognised.
    Flashcard(Flashcard),
    /// Generation finished normally.
    Complete { count: usize },
    /// Generation failed. Records sent before this remain valid.
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Flashcard(_) => "flashcard",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// JSON payload for this event.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            StreamEvent::Connected { session_id } => {
                serde_json::json!({ "sessionId": session_id })
            }
            StreamEvent::Flashcard(card) => serde_json::json!({
                "question": card.question,
                "answer": card.answer,
            }),
            StreamEvent::Complete { count } => serde_json::json!({ "count": count }),
            StreamEvent::Error { message } => serde_json::json!({ "message": message }),
        }
    }

    /// Returns true if no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}
