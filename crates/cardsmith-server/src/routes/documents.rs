//! Document upload and flashcard streaming endpoints.

use std::convert::Infallible;
use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use cardsmith_session::SessionId;
use cardsmith_types::{DocumentFormat, StreamEvent};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Response body for a successful upload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Id to pass to the generation endpoint.
    pub session_id: String,
}

/// Query parameters for the generation endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateParams {
    pub session_id: Option<String>,
}

/// Create document routes. Mounted under `/documents`.
pub fn document_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/upload-document",
            post(upload_document).layer(DefaultBodyLimit::max(config.upload_body_limit())),
        )
        .route("/generate-flashcards", get(generate_flashcards))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /documents/upload-document
///
/// Accepts a multipart form; the first part carrying a file name is the
/// document. Other parts are ignored.
pub async fn upload_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ServerError> {
    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_owned);

        let format = DocumentFormat::detect(content_type.as_deref(), Some(&file_name))
            .ok_or_else(|| {
                ServerError::UnsupportedMediaType(format!(
                    "'{}' is not a PDF or DOCX document",
                    file_name
                ))
            })?;

        let payload = field.bytes().await.map_err(multipart_error)?;
        if payload.len() > state.config.max_upload_bytes {
            return Err(too_large(state.config.max_upload_bytes));
        }
        if payload.is_empty() {
            return Err(ServerError::BadRequest(format!(
                "Uploaded file '{}' is empty",
                file_name
            )));
        }

        let size = payload.len();
        let id = state.sessions().put(payload, format, file_name.clone())?;
        info!(
            session_id = %id,
            format = %format,
            file_name = %file_name,
            bytes = size,
            "Document uploaded"
        );

        return Ok(Json(UploadResponse {
            session_id: id.to_string(),
        }));
    }

    Err(ServerError::BadRequest(
        "No file in upload; send the document as a multipart file field".to_string(),
    ))
}

/// GET /documents/generate-flashcards?sessionId=...
///
/// Validation failures are JSON errors. Once validated, the response is an
/// event stream that always starts with `connected` and ends with exactly
/// one `complete` or `error`.
pub async fn generate_flashcards(
    State(state): State<AppState>,
    params: Result<Query<GenerateParams>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let Query(params) = params.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let raw_id = params
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("sessionId query parameter is required".into()))?;
    let id = SessionId::from_str(raw_id.trim())?;

    let events = state.generation.generate(&id).await?;
    debug!(session_id = %id, "Opening flashcard stream");

    let sse_stream = events.map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event.payload())
        .unwrap_or_else(|_| Event::default().event(event.name()))
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(e.body_text())
    } else {
        ServerError::BadRequest(e.body_text())
    }
}

fn too_large(limit: usize) -> ServerError {
    ServerError::PayloadTooLarge(format!(
        "Document exceeds the {} MB upload limit",
        limit / (1024 * 1024)
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, header},
        response::Response,
    };
    use cardsmith_domain::GenerationService;
    use cardsmith_extract::{ExtractorRegistry, TextExtractor};
    use cardsmith_llm::{MockBackend, MockResponse};
    use cardsmith_session::{CapacityPolicy, SessionStore, StoreConfig};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cardsmith-test-boundary";

    /// Reads every PDF as the text it was uploaded with.
    struct Utf8AsPdf;

    #[async_trait]
    impl TextExtractor for Utf8AsPdf {
        fn format(&self) -> DocumentFormat {
            DocumentFormat::Pdf
        }

        async fn extract(&self, bytes: &[u8]) -> cardsmith_extract::Result<String> {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    struct Fixture {
        state: AppState,
        backend: Arc<MockBackend>,
    }

    impl Fixture {
        fn new(responses: Vec<MockResponse>) -> Self {
            Self::with(responses, StoreConfig::new(), ServerConfig::new())
        }

        fn with(responses: Vec<MockResponse>, store: StoreConfig, config: ServerConfig) -> Self {
            let mut extractors = ExtractorRegistry::with_defaults();
            extractors.register(Utf8AsPdf);

            let backend = Arc::new(MockBackend::new(responses));
            let service =
                GenerationService::new(SessionStore::new(store), extractors, backend.clone());

            Self {
                state: AppState::new(service, config),
                backend,
            }
        }

        fn router(&self) -> Router {
            Router::new()
                .nest("/documents", document_routes(&self.state.config))
                .with_state(self.state.clone())
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router().oneshot(request).await.unwrap()
        }

        async fn upload(&self, file_name: &str, content_type: &str, data: &[u8]) -> Response {
            let body = multipart_body(&[Part::file("document", file_name, content_type, data)]);
            self.send(upload_request(body)).await
        }

        async fn upload_id(&self, text: &str) -> String {
            let response = self.upload("notes.pdf", "application/pdf", text.as_bytes()).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body: UploadResponse = serde_json::from_slice(&read_body(response).await).unwrap();
            body.session_id
        }

        async fn generate(&self, query: &str) -> Response {
            self.send(
                Request::builder()
                    .uri(format!("/documents/generate-flashcards{query}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }
    }

    struct Part<'a> {
        name: &'a str,
        file_name: Option<&'a str>,
        content_type: Option<&'a str>,
        data: &'a [u8],
    }

    impl<'a> Part<'a> {
        fn file(name: &'a str, file_name: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
            Self {
                name,
                file_name: Some(file_name),
                content_type: Some(content_type),
                data,
            }
        }

        fn text(name: &'a str, data: &'a str) -> Self {
            Self {
                name,
                file_name: None,
                content_type: None,
                data: data.as_bytes(),
            }
        }
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match part.file_name {
                Some(file_name) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, file_name
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
            };
            body.extend_from_slice(disposition.as_bytes());
            if let Some(content_type) = part.content_type {
                body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/documents/upload-document")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_body(response: Response) -> axum::body::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    async fn error_code(response: Response) -> String {
        let body: Value = serde_json::from_slice(&read_body(response).await).unwrap();
        body["code"].as_str().unwrap().to_string()
    }

    /// Parse an event-stream body into `(event, data)` pairs.
    fn parse_sse(body: &[u8]) -> Vec<(String, Value)> {
        let text = std::str::from_utf8(body).unwrap();
        text.split("\n\n")
            .filter_map(|block| {
                let mut name = None;
                let mut data = None;
                for line in block.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data = Some(serde_json::from_str(value.trim()).unwrap());
                    }
                }
                Some((name?, data?))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upload_returns_session_id() {
        let f = Fixture::new(vec![]);
        let id = f.upload_id("Mitochondria produce ATP.").await;

        let session = f.state.sessions().get(&id.parse().unwrap()).unwrap();
        assert_eq!(session.format, DocumentFormat::Pdf);
        assert_eq!(session.original_name, "notes.pdf");
        assert_eq!(&session.payload[..], b"Mitochondria produce ATP.");
    }

    #[tokio::test]
    async fn test_upload_format_from_extension_when_mime_is_generic() {
        let f = Fixture::new(vec![]);
        let response = f
            .upload("report.DOCX", "application/octet-stream", b"PK\x03\x04")
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: UploadResponse = serde_json::from_slice(&read_body(response).await).unwrap();
        let session = f.state.sessions().get(&body.session_id.parse().unwrap()).unwrap();
        assert_eq!(session.format, DocumentFormat::Docx);
    }

    #[tokio::test]
    async fn test_upload_skips_non_file_fields() {
        let f = Fixture::new(vec![]);
        let body = multipart_body(&[
            Part::text("title", "Biology"),
            Part::file("upload", "cells.pdf", "application/pdf", b"cells"),
        ]);

        let response = f.send(upload_request(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(f.state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_type() {
        let f = Fixture::new(vec![]);
        let response = f.upload("notes.txt", "text/plain", b"plain text").await;

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(error_code(response).await, "unsupported_media_type");
        assert!(f.state.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_upload_declared_type_wins_over_extension() {
        let f = Fixture::new(vec![]);
        let response = f.upload("notes.pdf", "text/plain", b"plain text").await;

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(f.state.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_file_is_bad_request() {
        let f = Fixture::new(vec![]);
        let body = multipart_body(&[Part::text("title", "no file here")]);

        let response = f.send(upload_request(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_not_multipart_is_bad_request() {
        let f = Fixture::new(vec![]);
        let response = f
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/documents/upload-document")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "bad_request");
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_rejected() {
        let f = Fixture::with(
            vec![],
            StoreConfig::new(),
            ServerConfig::new().with_max_upload_bytes(16),
        );
        let response = f.upload("big.pdf", "application/pdf", &[b'x'; 64]).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(f.state.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_upload_when_store_full_and_rejecting() {
        let store = StoreConfig::new()
            .with_max_sessions(1)
            .with_capacity_policy(CapacityPolicy::Reject);
        let f = Fixture::with(vec![], store, ServerConfig::new());

        f.upload_id("first").await;
        let response = f.upload("second.pdf", "application/pdf", b"second").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(f.state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_generate_streams_events_and_consumes_session() {
        let f = Fixture::new(vec![MockResponse::fragments([
            r#"[{"question":"What produces ATP?","#,
            r#""answer":"Mitochondria"}]"#,
        ])]);
        let id = f.upload_id("Mitochondria produce ATP.").await;

        let response = f.generate(&format!("?sessionId={id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let events = parse_sse(&read_body(response).await);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["connected", "flashcard", "complete"]);
        assert_eq!(events[0].1["sessionId"], id.as_str());
        assert_eq!(events[1].1["question"], "What produces ATP?");
        assert_eq!(events[1].1["answer"], "Mitochondria");
        assert_eq!(events[2].1["count"], 1);

        assert!(f.state.sessions().is_empty());

        let again = f.generate(&format!("?sessionId={id}")).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        assert_eq!(f.backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_upstream_failure_keeps_session() {
        let f = Fixture::new(vec![
            MockResponse::failing("upstream unavailable"),
            MockResponse::fragments([r#"[{"question":"Q","answer":"A"}]"#]),
        ]);
        let id = f.upload_id("Some text").await;

        let events = parse_sse(&read_body(f.generate(&format!("?sessionId={id}")).await).await);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["connected", "error"]);
        assert!(events[1].1["message"].as_str().unwrap().contains("upstream unavailable"));

        let events = parse_sse(&read_body(f.generate(&format!("?sessionId={id}")).await).await);
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["connected", "flashcard", "complete"]);
    }

    #[tokio::test]
    async fn test_generate_missing_session_id() {
        let f = Fixture::new(vec![]);

        for query in ["", "?sessionId=", "?sessionId=%20"] {
            let response = f.generate(query).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query {query:?}");
        }
    }

    #[tokio::test]
    async fn test_generate_malformed_session_id() {
        let f = Fixture::new(vec![]);
        let response = f.generate("?sessionId=not-a-uuid").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_unknown_session() {
        let f = Fixture::new(vec![]);
        let response = f
            .generate(&format!("?sessionId={}", SessionId::new()))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, "not_found");
        assert_eq!(f.backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_empty_document_is_unprocessable() {
        let f = Fixture::new(vec![]);
        let id = f.upload_id("   \n  ").await;

        let response = f.generate(&format!("?sessionId={id}")).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(f.state.sessions().contains(&id.parse().unwrap()));
    }

    #[tokio::test]
    async fn test_generate_while_in_flight_is_conflict() {
        let f = Fixture::new(vec![]);
        let id = f.upload_id("Some text").await;
        let claim = f.state.sessions().claim(&id.parse().unwrap()).unwrap();

        let response = f.generate(&format!("?sessionId={id}")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        drop(claim);
        assert!(f.state.sessions().contains(&id.parse().unwrap()));
    }
}
