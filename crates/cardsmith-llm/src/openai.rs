//! Streaming chat completions against OpenAI and compatible servers.
//!
//! Groq and Ollama speak the same `/chat/completions` protocol, so one backend
//! covers all three with different presets.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, header};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{FragmentStream, LlmBackend};
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, Role};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GROQ_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434/v1";

/// Hosted providers start streaming well inside this.
const HOSTED_TIMEOUT: Duration = Duration::from_secs(300);
/// Local models on modest hardware can take minutes to read a long prompt.
const LOCAL_TIMEOUT: Duration = Duration::from_secs(600);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Where and how to reach a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Sent as a bearer token when present. Ollama runs without one.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Used when a request arrives with an empty model name.
    pub model: Option<String>,
    /// Bounds connecting and each wait for the next chunk, never the whole
    /// stream: a long generation that keeps producing runs to the end.
    pub timeout: Duration,
    /// Shown in logs and returned by `LlmBackend::name`.
    pub name: String,
}

impl OpenAiConfig {
    fn preset(name: &str, base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.to_string(),
            model: None,
            timeout,
            name: name.to_string(),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::preset("openai", DEFAULT_OPENAI_BASE, Some(api_key.into()), HOSTED_TIMEOUT)
    }

    /// Groq's OpenAI-compatible endpoint, defaulting to a small Llama model.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::preset("groq", DEFAULT_GROQ_BASE, Some(api_key.into()), HOSTED_TIMEOUT)
            .with_model("llama-3.1-8b-instant")
    }

    /// A local Ollama server.
    pub fn ollama() -> Self {
        Self::preset("ollama", DEFAULT_OLLAMA_BASE, None, LOCAL_TIMEOUT)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()
            .map(|client| Self { client, config })
            .map_err(|e| LlmError::Internal(format!("HTTP client setup failed: {e}")))
    }

    /// Build the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Add authentication headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream");

        if let Some(ref api_key) = self.config.api_key {
            builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key))
        } else {
            builder
        }
    }

    /// Convert our CompletionRequest to OpenAI-compatible format.
    fn to_openai_request(&self, request: &CompletionRequest) -> Result<OpenAiChatRequest> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage {
                role: "system",
                content: system.clone(),
            });
        }

        for m in &request.messages {
            messages.push(OpenAiMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content.clone(),
            });
        }

        // Request model wins; fall back to the configured one.
        let model = if request.model.trim().is_empty() {
            self.config.model.clone().ok_or_else(|| {
                LlmError::InvalidRequest("No model specified for completion".to_string())
            })?
        } else {
            request.model.clone()
        };

        Ok(OpenAiChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            stream: true,
        })
    }

    /// Handle an error response.
    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(error) = serde_json::from_str::<OpenAiErrorResponse>(&body) {
            error.error.into_llm_error(Some(status.as_u16()))
        } else {
            LlmError::Backend(format!("HTTP {}: {}", status, body))
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn stream_text(&self, request: CompletionRequest) -> Result<FragmentStream> {
        let openai_request = self.to_openai_request(&request)?;

        tracing::debug!(
            backend = %self.config.name,
            model = %openai_request.model,
            messages = openai_request.messages.len(),
            max_tokens = request.max_tokens,
            "Sending OpenAI-compatible streaming request"
        );

        let response = self
            .add_headers(self.client.post(self.completions_url()))
            .json(&openai_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        Ok(parse_openai_sse_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

/// Create a shared OpenAI-compatible backend.
pub fn create_shared_backend(config: OpenAiConfig) -> Result<Arc<dyn LlmBackend>> {
    Ok(Arc::new(OpenAiBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAiError {
    fn into_llm_error(self, status: Option<u16>) -> LlmError {
        let code = self
            .code
            .as_ref()
            .and_then(|c| c.as_str())
            .unwrap_or_default();

        if code == "content_policy_violation" || code == "content_filter" {
            return LlmError::ContentPolicy(self.message);
        }

        match status {
            Some(401) | Some(403) => {
                LlmError::Auth(format!("Authentication failed: {}", self.message))
            }
            Some(429) => LlmError::RateLimit(self.message),
            Some(400) | Some(404) | Some(422) => LlmError::InvalidRequest(self.message),
            Some(500..=599) => LlmError::Backend(format!("Server error: {}", self.message)),
            _ => LlmError::Backend(self.message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

fn parse_openai_sse_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
) -> FragmentStream
where
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(futures::stream::unfold(
        OpenAiSseState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            exhausted: false,
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }

            loop {
                // Process complete lines in buffer. Lines are split on raw
                // bytes so multi-byte characters may straddle chunks.
                while let Some(line_end) = state.buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim_start();

                    match parse_sse_data(data) {
                        SseLine::Skip => continue,
                        SseLine::Fragment(text) => return Some((Ok(text), state)),
                        SseLine::Done => {
                            state.done = true;
                            return None;
                        }
                        SseLine::Failed(err) => {
                            state.done = true;
                            return Some((Err(err), state));
                        }
                    }
                }

                if state.exhausted {
                    return None;
                }

                // Need more data
                match state.byte_stream.next().await {
                    Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(LlmError::Network(e.to_string())), state));
                    }
                    None => {
                        // Flush a final unterminated line.
                        state.exhausted = true;
                        state.buffer.push(b'\n');
                    }
                }
            }
        },
    ))
}

/// Outcome of one `data:` payload.
#[derive(Debug)]
enum SseLine {
    Skip,
    Fragment(String),
    Done,
    Failed(LlmError),
}

fn parse_sse_data(data: &str) -> SseLine {
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::trace!(error = %e, "Skipping unparseable stream chunk");
            return SseLine::Skip;
        }
    };

    if let Some(error) = chunk.error {
        return SseLine::Failed(error.into_llm_error(None));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return SseLine::Skip;
    };

    match choice.finish_reason.as_deref() {
        Some("content_filter") => {
            return SseLine::Failed(LlmError::ContentPolicy(
                "Output was blocked by the provider's content filter".to_string(),
            ));
        }
        Some("length") => {
            tracing::warn!("Completion stopped at the max_tokens limit");
        }
        _ => {}
    }

    match choice.delta.and_then(|d| d.content) {
        Some(content) if !content.is_empty() => SseLine::Fragment(content),
        _ => SseLine::Skip,
    }
}

struct OpenAiSseState<E> {
    byte_stream: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, E>> + Send>>,
    buffer: Vec<u8>,
    exhausted: bool,
    done: bool,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
