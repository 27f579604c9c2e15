//! End-to-end tests over a real listener: upload a document, stream flashcards.

mod common;

use anyhow::Result;
use cardsmith_llm::MockResponse;
use cardsmith_session::{CapacityPolicy, StoreConfig};
use serde_json::Value;

use common::{DOCX_MIME, TestServer, docx, event_names, parse_sse};

#[tokio::test]
async fn test_health() -> Result<()> {
    let server = TestServer::start(vec![]).await?;

    let body: Value = server
        .client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeSessions"], 0);
    Ok(())
}

#[tokio::test]
async fn test_docx_upload_to_flashcards() -> Result<()> {
    let server = TestServer::start(vec![MockResponse::fragments([
        "Here are your cards:\n```json\n[",
        r#"{"question":"What do plants absorb?","answer":"Carbon dioxide"},"#,
        r#"{"question":"What do plants rel"#,
        r#"ease?","answer":"Oxygen"}"#,
        "]\n```",
    ])])
    .await?;

    let document = docx(&[
        "Plants absorb carbon dioxide.",
        "They release oxygen during photosynthesis.",
    ]);
    let id = server.upload_id("plants.docx", DOCX_MIME, document).await?;

    let response = server.generate(&id).await?;
    assert_eq!(response.status(), 200);
    let events = parse_sse(&response.text().await?);

    assert_eq!(
        event_names(&events),
        ["connected", "flashcard", "flashcard", "complete"]
    );
    assert_eq!(events[0].1["sessionId"], id.as_str());
    assert_eq!(events[1].1["answer"], "Carbon dioxide");
    assert_eq!(events[2].1["question"], "What do plants release?");
    assert_eq!(events[3].1["count"], 2);

    // The extracted document text reached the model.
    let request = &server.backend.requests()[0];
    assert!(request.messages[0].content.contains("Plants absorb carbon dioxide."));

    // One-shot: the session is gone after a completed stream.
    let again = server.generate(&id).await?;
    assert_eq!(again.status(), 404);
    let error: Value = again.json().await?;
    assert_eq!(error["code"], "not_found");
    Ok(())
}

#[tokio::test]
async fn test_midstream_failure_then_retry() -> Result<()> {
    let server = TestServer::start(vec![
        MockResponse::fragments([r#"[{"question":"Q1","answer":"A1"},{"ques"#])
            .then_fail("connection reset"),
        MockResponse::fragments([r#"[{"question":"Q1","answer":"A1"}]"#]),
    ])
    .await?;
    let id = server
        .upload_id("notes.docx", DOCX_MIME, docx(&["Some notes."]))
        .await?;

    let first = parse_sse(&server.generate(&id).await?.text().await?);
    assert_eq!(event_names(&first), ["connected", "flashcard", "error"]);
    assert!(
        first[2].1["message"]
            .as_str()
            .is_some_and(|m| m.contains("connection reset"))
    );

    let second = parse_sse(&server.generate(&id).await?.text().await?);
    assert_eq!(event_names(&second), ["connected", "flashcard", "complete"]);
    assert_eq!(server.backend.request_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_uploads_get_distinct_sessions() -> Result<()> {
    let server = TestServer::start(vec![
        MockResponse::fragments([r#"{"question":"Q","answer":"A"}"#]),
        MockResponse::fragments([r#"{"question":"Q","answer":"A"}"#]),
    ])
    .await?;

    let (biology, history) = tokio::join!(
        server.upload_id("biology.docx", DOCX_MIME, docx(&["Mitochondria make ATP."])),
        server.upload_id("history.docx", DOCX_MIME, docx(&["Rome fell in 476."])),
    );
    let (biology, history) = (biology?, history?);
    assert_ne!(biology, history);

    let health: Value = server
        .client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["activeSessions"], 2);

    // Generate in the opposite order so a swapped payload would show.
    for id in [&history, &biology] {
        let events = parse_sse(&server.generate(id).await?.text().await?);
        assert_eq!(events[0].1["sessionId"], id.as_str());
        assert_eq!(event_names(&events).last(), Some(&"complete"));
    }

    let requests = server.backend.requests();
    assert!(requests[0].messages[0].content.contains("Rome fell in 476."));
    assert!(!requests[0].messages[0].content.contains("Mitochondria"));
    assert!(requests[1].messages[0].content.contains("Mitochondria make ATP."));
    assert!(!requests[1].messages[0].content.contains("Rome"));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_docx_is_unprocessable() -> Result<()> {
    let server = TestServer::start(vec![]).await?;
    let id = server
        .upload_id("broken.docx", DOCX_MIME, b"definitely not a zip archive".to_vec())
        .await?;

    let response = server.generate(&id).await?;
    assert_eq!(response.status(), 422);
    assert_eq!(server.backend.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unsupported_upload() -> Result<()> {
    let server = TestServer::start(vec![]).await?;

    let response = server
        .upload("slides.pptx", "application/octet-stream", vec![1, 2, 3])
        .await?;
    assert_eq!(response.status(), 415);
    let error: Value = response.json().await?;
    assert_eq!(error["code"], "unsupported_media_type");
    Ok(())
}

#[tokio::test]
async fn test_full_store_rejects_uploads() -> Result<()> {
    let store = StoreConfig::new()
        .with_max_sessions(1)
        .with_capacity_policy(CapacityPolicy::Reject);
    let server = TestServer::start_with(vec![], store).await?;

    server
        .upload_id("a.docx", DOCX_MIME, docx(&["First."]))
        .await?;
    let response = server
        .upload("b.docx", DOCX_MIME, docx(&["Second."]))
        .await?;

    assert_eq!(response.status(), 503);
    Ok(())
}
