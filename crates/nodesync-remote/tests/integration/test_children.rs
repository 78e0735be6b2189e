//! Listing and node detail tests

use nodesync_core::domain::NodeType;
use nodesync_core::ports::{ErrorClass, IRemoteGateway, RemoteError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_list_children_sends_pagination_and_auth() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/root/children"))
        .and(query_param("skipCount", "100"))
        .and(query_param("maxItems", "100"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::children_page("root", 100, 20, 120)))
        .expect(1)
        .mount(&server)
        .await;

    let page = gateway.list_children("root", 100, 100).await.unwrap();
    assert_eq!(page.nodes.len(), 20);
    assert_eq!(page.skip_count, 100);
    assert_eq!(page.total_items, Some(120));
    assert_eq!(page.nodes[0].guid, "n100");
    assert_eq!(page.nodes[0].parent_guid, "root");
    assert_eq!(page.next_skip_count(), None);
}

#[tokio::test]
async fn test_full_page_requests_follow_up() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/root/children"))
        .and(query_param("skipCount", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::children_page("root", 0, 100, 100)))
        .mount(&server)
        .await;

    let page = gateway.list_children("root", 0, 100).await.unwrap();
    assert_eq!(page.nodes.len(), 100);
    assert_eq!(page.next_skip_count(), Some(100));
}

#[tokio::test]
async fn test_node_detail_maps_folder() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/folder-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entry": {
                "id": "folder-1", "name": "Projects", "nodeType": "cm:folder",
                "isFolder": true, "parentId": "root",
                "path": { "name": "/Company Home" },
                "isFavorite": true
            }
        })))
        .mount(&server)
        .await;

    let node = gateway.node_detail("folder-1").await.unwrap();
    assert_eq!(node.node_type, NodeType::Folder);
    assert_eq!(node.parent_guid, "root");
    assert_eq!(node.path, "/Company Home");
    assert_eq!(node.favorite, Some(true));
}

#[tokio::test]
async fn test_not_found_is_authoritative_absence() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "errorKey": "framework.exception.EntityNotFound", "briefSummary": "gone not found" }
        })))
        .mount(&server)
        .await;

    let err = gateway.node_detail("gone").await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(ref m) if m == "gone not found"));
    assert_eq!(err.classify(), ErrorClass::AuthoritativeAbsence);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/root/children"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = gateway.list_children("root", 0, 100).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.classify(), ErrorClass::Transient);
}

#[tokio::test]
async fn test_429_is_retried_after_delay() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nodes/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entry": common::file_entry("busy", "busy.txt", "root")
        })))
        .mount(&server)
        .await;

    let node = gateway.node_detail("busy").await.unwrap();
    assert_eq!(node.guid, "busy");
}

#[tokio::test]
async fn test_429_exhaustion_reports_rate_limit() {
    let (server, gateway) = common::setup_gateway(1).await;

    Mock::given(method("GET"))
        .and(path("/nodes/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = gateway.node_detail("busy").await.unwrap_err();
    assert!(matches!(err, RemoteError::TooManyRequests { .. }));
}
