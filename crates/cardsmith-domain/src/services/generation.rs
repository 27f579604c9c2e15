//! Flashcard generation orchestration.
//!
//! One request moves through these states:
//!
//! ```text
//! INIT ──prepare()──▶ VALIDATED ──stream()──▶ STREAMING ──▶ COMPLETE
//!   │                                             │
//!   └──▶ error (no stream opened)                 └──▶ FAILED
//! ```
//!
//! `prepare` claims the session, extracts the document text and builds the
//! prompt; any failure there is a [`DomainError`] and nothing has been sent to
//! the model. `stream` opens the event stream. From then on failures are
//! reported as a terminal [`StreamEvent::Error`]. A completed stream retires
//! the session; a failed one releases it so the same id can be retried until
//! it expires.

use std::pin::Pin;
use std::sync::Arc;

use cardsmith_extract::ExtractorRegistry;
use cardsmith_llm::{CompletionRequest, SharedBackend};
use cardsmith_session::{SessionClaim, SessionId, SessionStore};
use cardsmith_types::StreamEvent;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{DomainError, Result};
use crate::prompt::{build_request, truncate_chars};
use crate::records::record_events;

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default generation budget in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default cap on document characters sent to the model.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 15_000;

/// Events buffered between the driver task and the consumer.
const EVENT_BUFFER: usize = 64;

/// Ordered events for one generation request.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;

/// Generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Extracted text beyond this many characters is dropped before prompting.
    pub max_document_chars: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
        }
    }
}

impl GenerationOptions {
    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the document character cap.
    pub fn with_max_document_chars(mut self, max: usize) -> Self {
        self.max_document_chars = max;
        self
    }
}

/// A validated request, holding the session claim until streamed or dropped.
#[derive(Debug)]
pub struct PreparedGeneration {
    claim: SessionClaim,
    request: CompletionRequest,
    document_chars: usize,
    truncated: bool,
}

impl PreparedGeneration {
    /// The claimed session id.
    pub fn session_id(&self) -> &SessionId {
        self.claim.id()
    }

    /// The request that will be sent to the backend.
    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }

    /// Characters of document text included in the prompt.
    pub fn document_chars(&self) -> usize {
        self.document_chars
    }

    /// Whether the document text was cut to fit the budget.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Orchestrates session lookup, text extraction, prompting and streaming.
#[derive(Clone)]
pub struct GenerationService {
    sessions: SessionStore,
    extractors: Arc<ExtractorRegistry>,
    backend: SharedBackend,
    options: GenerationOptions,
}

impl GenerationService {
    /// Create a new generation service with default options.
    pub fn new(sessions: SessionStore, extractors: ExtractorRegistry, backend: SharedBackend) -> Self {
        Self {
            sessions,
            extractors: Arc::new(extractors),
            backend,
            options: GenerationOptions::default(),
        }
    }

    /// Set generation options.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Get the generation options.
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Get the backend name.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Validate a request: claim the session, extract its text, build the prompt.
    ///
    /// Nothing is sent to the backend. On failure the claim is released.
    pub async fn prepare(&self, id: &SessionId) -> Result<PreparedGeneration> {
        let claim = self.sessions.claim(id)?;
        let session = claim.session();

        debug!(
            session_id = %id,
            format = %session.format,
            bytes = session.payload.len(),
            "Extracting document text"
        );

        let text = match self.extractors.extract(session.format, &session.payload).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Text extraction failed");
                return Err(e.into());
            }
        };

        let text = text.trim();
        if text.is_empty() {
            warn!(session_id = %id, "Document contains no extractable text");
            return Err(DomainError::Extraction(
                "Document contains no extractable text".to_string(),
            ));
        }

        let (document, truncated) = truncate_chars(text, self.options.max_document_chars);
        if truncated {
            debug!(
                session_id = %id,
                limit = self.options.max_document_chars,
                "Document text truncated"
            );
        }

        let request = build_request(document, &self.options);
        let document_chars = document.chars().count();

        Ok(PreparedGeneration {
            claim,
            request,
            document_chars,
            truncated,
        })
    }

    /// Open the event stream for a prepared request.
    ///
    /// The first event is always `Connected`. Generation runs on its own task
    /// and finishes even if the returned stream is dropped early.
    pub fn stream(&self, prepared: PreparedGeneration) -> EventStream {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(drive(self.backend.clone(), prepared, tx));

        Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }

    /// Prepare and stream in one step.
    pub async fn generate(&self, id: &SessionId) -> Result<EventStream> {
        let prepared = self.prepare(id).await?;
        Ok(self.stream(prepared))
    }
}

/// Forward events to the consumer, tolerating its disappearance.
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    session_id: String,
    connected: bool,
}

impl EventSink {
    async fn send(&mut self, event: StreamEvent) {
        if !self.connected {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.connected = false;
            debug!(session_id = %self.session_id, "Consumer went away; generation continues");
        }
    }
}

async fn drive(backend: SharedBackend, prepared: PreparedGeneration, tx: mpsc::Sender<StreamEvent>) {
    let PreparedGeneration {
        claim,
        request,
        document_chars,
        ..
    } = prepared;

    let session_id = claim.id().to_string();
    let mut sink = EventSink {
        tx,
        session_id: session_id.clone(),
        connected: true,
    };

    sink.send(StreamEvent::Connected {
        session_id: session_id.clone(),
    })
    .await;

    info!(
        session_id = %session_id,
        backend = backend.name(),
        model = %request.model,
        document_chars,
        "Starting flashcard generation"
    );

    let fragments = match backend.stream_text(request).await {
        Ok(fragments) => fragments,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Generation request failed");
            claim.release();
            sink.send(StreamEvent::Error {
                message: e.to_string(),
            })
            .await;
            return;
        }
    };

    let events = record_events(fragments);
    futures::pin_mut!(events);

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Complete { count } => {
                // Retire before announcing completion so the id is already
                // gone when the consumer sees the terminal event.
                claim.retire();
                info!(session_id = %session_id, count, "Flashcard generation complete");
                sink.send(StreamEvent::Complete { count }).await;
                return;
            }
            StreamEvent::Error { message } => {
                warn!(session_id = %session_id, error = %message, "Generation stream failed");
                claim.release();
                sink.send(StreamEvent::Error { message }).await;
                return;
            }
            event => sink.send(event).await,
        }
    }
}
