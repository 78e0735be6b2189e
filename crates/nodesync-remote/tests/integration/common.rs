//! Shared test helpers for repository API integration tests
//!
//! Each helper mounts the endpoints a test needs on a wiremock server and
//! returns a gateway pointing at it.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nodesync_core::config::RenditionBackoff;
use nodesync_remote::{RemoteClient, RemoteNodeGateway, RenditionPolicy, StaticTokenProvider};

pub const TOKEN: &str = "test-access-token";

/// Rendition policy fast enough for tests
pub fn quick_renditions(max_retries: u32) -> RenditionPolicy {
    RenditionPolicy {
        interval: Duration::from_millis(10),
        max_retries,
        backoff: RenditionBackoff::Fixed,
    }
}

/// Starts a mock server and returns a gateway rooted at it
pub async fn setup_gateway(max_rendition_retries: u32) -> (MockServer, RemoteNodeGateway) {
    let server = MockServer::start().await;
    let client = RemoteClient::new(server.uri(), Arc::new(StaticTokenProvider::new(TOKEN)))
        .with_max_retries(2);
    let gateway = RemoteNodeGateway::new(client, quick_renditions(max_rendition_retries));
    (server, gateway)
}

/// JSON entry for a file node
pub fn file_entry(id: &str, name: &str, parent: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "nodeType": "cm:content",
        "isFolder": false,
        "isFile": true,
        "modifiedAt": "2026-03-01T10:15:30.000+0000",
        "parentId": parent,
        "content": { "mimeType": "text/plain", "sizeInBytes": 5 },
        "allowableOperations": ["update", "delete"]
    })
}

/// JSON listing page with `count` generated file entries
pub fn children_page(parent: &str, skip: u32, count: u32, total: u32) -> serde_json::Value {
    let entries: Vec<_> = (skip..skip + count)
        .map(|i| serde_json::json!({ "entry": file_entry(&format!("n{i}"), &format!("file-{i}.txt"), parent) }))
        .collect();
    serde_json::json!({
        "list": {
            "pagination": {
                "count": count,
                "hasMoreItems": skip + count < total,
                "totalItems": total,
                "skipCount": skip,
                "maxItems": 100
            },
            "entries": entries
        }
    })
}

/// Mounts `GET nodes/{id}/content` returning `body`
pub async fn mount_content(server: &MockServer, id: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/nodes/{id}/content")))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Starts a server that reads each request and closes the socket unanswered
///
/// Returns the server's base URL.
pub async fn spawn_hangup_server() -> String {
    use tokio::io::AsyncReadExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });
    format!("http://{addr}")
}
