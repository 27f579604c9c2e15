//! LLM backend trait and mock implementation.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::types::CompletionRequest;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Types
// ─────────────────────────────────────────────────────────────────────────────

/// Raw text fragments in the order the model produced them.
///
/// The stream ends normally when the model finishes. An `Err` item is
/// terminal: backends yield nothing after it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for LLM backend providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Start a completion and stream its text.
    ///
    /// Errors before the first byte (bad credentials, unknown model) are
    /// returned directly; errors mid-stream arrive as an `Err` item.
    async fn stream_text(&self, request: CompletionRequest) -> Result<FragmentStream>;

    /// Get the name of this backend.
    fn name(&self) -> &str;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockResponse};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use crate::error::LlmError;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// One scripted completion.
    #[derive(Debug, Clone, Default)]
    pub struct MockResponse {
        /// Fragments yielded in order.
        pub fragments: Vec<String>,
        /// Mid-stream failure yielded after all fragments.
        pub error: Option<String>,
        /// Failure returned before any fragment.
        pub fail_on_start: Option<String>,
        /// Pause before each fragment.
        pub delay: Option<Duration>,
    }

    impl MockResponse {
        /// A response streaming the given fragments.
        pub fn fragments<I, S>(fragments: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                fragments: fragments.into_iter().map(Into::into).collect(),
                ..Default::default()
            }
        }

        /// A response that fails before streaming.
        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                fail_on_start: Some(message.into()),
                ..Default::default()
            }
        }

        /// Fail with a backend error after the scripted fragments.
        pub fn then_fail(mut self, message: impl Into<String>) -> Self {
            self.error = Some(message.into());
            self
        }

        /// Pause before each fragment.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    /// A mock backend for testing purposes.
    ///
    /// Returns pre-configured responses in order. If more requests are made
    /// than responses available, an error is returned.
    #[derive(Debug)]
    pub struct MockBackend {
        name: String,
        responses: Mutex<Vec<MockResponse>>,
        request_log: Mutex<Vec<CompletionRequest>>,
    }

    impl MockBackend {
        /// Create a new mock backend with the given responses.
        pub fn new(responses: Vec<MockResponse>) -> Self {
            Self {
                name: "mock".to_string(),
                responses: Mutex::new(responses),
                request_log: Mutex::new(Vec::new()),
            }
        }

        /// Create a mock backend with a single fragmented response.
        pub fn with_fragments<I, S>(fragments: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self::new(vec![MockResponse::fragments(fragments)])
        }

        /// Get all requests that were made to this backend.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.request_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Get the number of requests made.
        pub fn request_count(&self) -> usize {
            self.request_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn stream_text(&self, request: CompletionRequest) -> Result<FragmentStream> {
            self.request_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);

            let response = {
                let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
                if responses.is_empty() {
                    return Err(LlmError::Backend(
                        "MockBackend: no more responses available".to_string(),
                    ));
                }
                responses.remove(0)
            };

            if let Some(message) = response.fail_on_start {
                return Err(LlmError::Backend(message));
            }

            let delay = response.delay;
            let fragments = futures::stream::iter(response.fragments).then(move |fragment| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, LlmError>(fragment)
            });
            let tail = futures::stream::iter(response.error.map(|m| Err(LlmError::Backend(m))));

            Ok(Box::pin(fragments.chain(tail)))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
