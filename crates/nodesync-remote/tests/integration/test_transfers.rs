//! Download and upload tests

use std::time::Duration;

use nodesync_core::ports::{IRemoteGateway, NewNode, RemoteError};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

// ============================================================================
// Download tests
// ============================================================================

#[tokio::test]
async fn test_download_content_writes_file() {
    let (server, gateway) = common::setup_gateway(1).await;
    common::mount_content(&server, "file-1", b"Hello, repository!").await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("hello.txt");
    let written = gateway
        .download_content("file-1", &dest, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written.as_deref(), Some(dest.as_path()));
    assert_eq!(std::fs::read(&dest).unwrap(), b"Hello, repository!");
}

#[tokio::test]
async fn test_download_overwrites_previous_file() {
    let (server, gateway) = common::setup_gateway(1).await;
    common::mount_content(&server, "file-1", b"new").await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("f.txt");
    std::fs::write(&dest, b"old content that is longer").unwrap();

    gateway
        .download_content("file-1", &dest, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"new");
}

#[tokio::test]
async fn test_cancelled_download_resolves_to_none() {
    let (server, gateway) = common::setup_gateway(1).await;
    Mock::given(method("GET"))
        .and(path("/nodes/slow/content"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 1024])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.bin");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = gateway.download_content("slow", &dest, &cancel).await.unwrap();
    assert!(result.is_none());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_error_status_is_typed() {
    let (server, gateway) = common::setup_gateway(1).await;
    Mock::given(method("GET"))
        .and(path("/nodes/locked/content"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = gateway
        .download_content("locked", &dir.path().join("x"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Forbidden(_)));
}

#[tokio::test]
async fn test_connection_closed_before_response_is_silent() {
    let (_server, gateway) = common::setup_gateway(1).await;
    let base = common::spawn_hangup_server().await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("doc.pdf");
    let url = format!("{base}/nodes/doc/renditions/pdf/content");
    let result = gateway
        .download_url(&url, &dest, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_url_rejects_malformed_url() {
    let (_server, gateway) = common::setup_gateway(1).await;
    let dir = tempfile::tempdir().unwrap();
    let err = gateway
        .download_url("not a url", &dir.path().join("x"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidUrl(_)));
}

#[tokio::test]
async fn test_download_url_fetches_absolute_url() {
    let (server, gateway) = common::setup_gateway(1).await;
    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions/pdf/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("doc.pdf");
    let url = format!("{}/nodes/doc/renditions/pdf/content", server.uri());
    gateway
        .download_url(&url, &dest, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7");
}

// ============================================================================
// Upload tests
// ============================================================================

#[tokio::test]
async fn test_create_node_posts_multipart_with_auto_rename() {
    let (server, gateway) = common::setup_gateway(1).await;
    Mock::given(method("POST"))
        .and(path("/nodes/folder-1/children"))
        .and(query_param("autoRename", "true"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "entry": common::file_entry("new-1", "report-1.pdf", "folder-1")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = gateway
        .create_node(NewNode {
            parent_guid: "folder-1".to_string(),
            name: "report.pdf".to_string(),
            description: Some("Quarterly".to_string()),
            mimetype: "application/pdf".to_string(),
            content: b"%PDF".to_vec(),
            auto_rename: true,
        })
        .await
        .unwrap();

    assert_eq!(created.guid, "new-1");
    assert_eq!(created.title, "report-1.pdf");
    assert_eq!(created.parent_guid, "folder-1");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"filedata\""));
    assert!(body.contains("name=\"cm:description\""));
    assert!(body.contains("Quarterly"));
}

#[tokio::test]
async fn test_create_node_failure_is_typed() {
    let (server, gateway) = common::setup_gateway(1).await;
    Mock::given(method("POST"))
        .and(path("/nodes/folder-1/children"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&server)
        .await;

    let err = gateway
        .create_node(NewNode {
            parent_guid: "folder-1".to_string(),
            name: "big.bin".to_string(),
            description: None,
            mimetype: "application/octet-stream".to_string(),
            content: vec![1, 2, 3],
            auto_rename: true,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(507));
}
