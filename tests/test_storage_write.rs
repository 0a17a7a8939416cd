//! Object storage uploads through the Cloud Storage JSON API
//!
//! Tests the write node end to end against a mock storage endpoint:
//! - target and content type resolution
//! - request shape (path, query, headers, body)
//! - rejected uploads surface as host errors

use bytes::Bytes;
use flow_relay::config::StorageSection;
use flow_relay::flow::FlowNode;
use flow_relay::protocol::FlowMessage;
use flow_relay::storage::{GcsBackend, StorageBackend, StorageError, StorageWriteNode};
use flow_relay::testing::RecordingHost;
use std::sync::Arc;
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(endpoint: &str, filename: &str) -> StorageSection {
    StorageSection {
        filename: filename.to_string(),
        content_type: String::new(),
        endpoint: endpoint.to_string(),
        token_env: None,
    }
}

#[tokio::test]
async fn test_backend_uploads_media_with_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/my-bucket/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "logs/2024/run.json"))
        .and(header("Authorization", "Bearer storage-token"))
        .and(header("Content-Type", "application/json"))
        .and(body_bytes(b"{\"ok\":true}".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = GcsBackend::new(&mock_server.uri(), Some("storage-token".to_string())).unwrap();

    let result = backend
        .write(
            "my-bucket",
            "logs/2024/run.json",
            Bytes::from("{\"ok\":true}"),
            Some("application/json"),
        )
        .await;

    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn test_backend_reports_rejected_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Access denied"))
        .mount(&mock_server)
        .await;

    let backend = GcsBackend::new(&mock_server.uri(), None).unwrap();
    let result = backend
        .write("bucket", "key", Bytes::from("data"), None)
        .await;

    match result {
        Err(StorageError::Status { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "Access denied");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_node_writes_to_message_target_and_forwards() {
    // Arrange
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/flow-bucket/o"))
        .and(query_param("name", "out/reading.txt"))
        .and(header("Content-Type", "text/plain"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let host = Arc::new(RecordingHost::new());
    let mut section = settings(&mock_server.uri(), "gs://default/ignored");
    section.content_type = "text/plain".to_string();
    let backend = GcsBackend::new(&section.endpoint, None).unwrap();
    let mut node = StorageWriteNode::new(&section, Arc::new(backend), host.clone());

    let msg = FlowMessage {
        filename: Some("gs://flow-bucket/out/reading.txt".to_string()),
        ..FlowMessage::new("21.5")
    };

    // Act
    node.on_input(msg.clone()).await;

    // Assert
    assert_eq!(host.sent(), vec![msg]);
    assert!(host.errors().is_empty());
}

#[tokio::test]
async fn test_node_reports_write_error_with_message() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&mock_server)
        .await;

    let host = Arc::new(RecordingHost::new());
    let section = settings(&mock_server.uri(), "gs://bucket/file.bin");
    let backend = GcsBackend::new(&section.endpoint, None).unwrap();
    let mut node = StorageWriteNode::new(&section, Arc::new(backend), host.clone());

    let msg = FlowMessage::new("data");
    node.on_input(msg.clone()).await;

    assert!(host.sent().is_empty());
    let errors = host.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.starts_with("write error: "));
    assert!(errors[0].0.contains("500"));
    assert_eq!(errors[0].1, Some(msg));
}

#[tokio::test]
async fn test_node_rejects_badly_formed_target_without_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let host = Arc::new(RecordingHost::new());
    let section = settings(&mock_server.uri(), "");
    let backend = GcsBackend::new(&section.endpoint, None).unwrap();
    let mut node = StorageWriteNode::new(&section, Arc::new(backend), host.clone());

    let msg = FlowMessage {
        filename: Some("https://bucket/file".to_string()),
        ..FlowMessage::new("data")
    };
    node.on_input(msg).await;

    assert_eq!(
        host.errors()[0].0,
        "Badly formed URL: https://bucket/file"
    );
    assert!(host.sent().is_empty());
}
