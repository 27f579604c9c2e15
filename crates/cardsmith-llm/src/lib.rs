//! LLM client abstraction for Cardsmith.
//!
//! The core abstraction is the [`LlmBackend`] trait: given a
//! [`CompletionRequest`], a backend returns a stream of raw text fragments as
//! the model produces them. Fragment boundaries are arbitrary; consumers must
//! not assume a fragment holds a complete token, word or JSON value.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  LlmBackend trait                           │
//! │  - stream_text() -> Stream<Result<String>>  │
//! └─────────────────────────────────────────────┘
//!                    │
//!     ┌──────────────┼──────────────┐
//!     ▼              ▼              ▼
//! ┌────────┐   ┌──────────┐   ┌────────┐
//! │ OpenAI │   │   Groq   │   │ Ollama │
//! └────────┘   └──────────┘   └────────┘
//! ```

pub mod backend;
pub mod error;
pub mod types;

// Provider implementations
pub mod openai;

pub use backend::{FragmentStream, LlmBackend, SharedBackend};
pub use error::{LlmError, Result};
pub use types::{CompletionRequest, Message, Role};

pub use openai::{OpenAiBackend, OpenAiConfig};

#[cfg(any(test, feature = "testing"))]
pub use backend::{MockBackend, MockResponse};
