//! Common test utilities for integration tests.

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use cardsmith_domain::GenerationService;
use cardsmith_extract::ExtractorRegistry;
use cardsmith_llm::{MockBackend, MockResponse};
use cardsmith_server::{AppState, Server, ServerConfig};
use cardsmith_session::{SessionStore, StoreConfig};

/// MIME type browsers send for `.docx` files.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// The scripted generation backend.
    pub backend: Arc<MockBackend>,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server whose backend plays the given responses in order.
    pub async fn start(responses: Vec<MockResponse>) -> Result<Self> {
        Self::start_with(responses, StoreConfig::new()).await
    }

    /// Start a server with a specific session store configuration.
    pub async fn start_with(responses: Vec<MockResponse>, store: StoreConfig) -> Result<Self> {
        let addr = find_available_port().await?;

        let backend = Arc::new(MockBackend::new(responses));
        let service = GenerationService::new(
            SessionStore::new(store),
            ExtractorRegistry::with_defaults(),
            backend.clone(),
        );
        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false);

        let server = Server::from_state(AppState::new(service, config));
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            backend,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Upload a document and return the raw response.
    pub async fn upload(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("document", part);

        Ok(self
            .client
            .post(format!("{}/documents/upload-document", self.base_url()))
            .multipart(form)
            .send()
            .await?)
    }

    /// Upload a document and return its session id.
    pub async fn upload_id(&self, file_name: &str, mime: &str, bytes: Vec<u8>) -> Result<String> {
        let response = self.upload(file_name, mime, bytes).await?;
        anyhow::ensure!(
            response.status().is_success(),
            "upload failed with {}",
            response.status()
        );
        let body: Value = response.json().await?;
        body["sessionId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("upload response has no sessionId"))
    }

    /// Request generation for a session.
    pub async fn generate(&self, session_id: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}/documents/generate-flashcards", self.base_url()))
            .query(&[("sessionId", session_id)])
            .send()
            .await?)
    }
}

/// Build a minimal DOCX whose paragraphs are the given lines.
pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Parse an event-stream body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = serde_json::from_str(value.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

/// Event names in order.
pub fn event_names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
