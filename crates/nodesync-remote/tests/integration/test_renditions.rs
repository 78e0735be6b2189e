//! Rendition state machine tests

use nodesync_core::ports::IRemoteGateway;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn renditions(pdf: &str, preview: &str) -> serde_json::Value {
    serde_json::json!({
        "list": {
            "entries": [
                { "entry": { "id": "doclib", "status": "CREATED" } },
                { "entry": { "id": "imgpreview", "status": preview } },
                { "entry": { "id": "pdf", "status": pdf } }
            ]
        }
    })
}

#[tokio::test]
async fn test_existing_pdf_resolves_without_creation() {
    let (server, gateway) = common::setup_gateway(3).await;

    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(renditions("CREATED", "CREATED")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/nodes/doc/renditions"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let url = gateway.rendition_url("doc").await.unwrap().unwrap();
    assert_eq!(url, format!("{}/nodes/doc/renditions/pdf/content", server.uri()));
}

#[tokio::test]
async fn test_created_preview_is_used_when_pdf_missing() {
    let (server, gateway) = common::setup_gateway(3).await;

    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(renditions("NOT_CREATED", "CREATED")))
        .mount(&server)
        .await;

    let url = gateway.rendition_url("doc").await.unwrap().unwrap();
    assert!(url.ends_with("/nodes/doc/renditions/imgpreview/content"));
}

#[tokio::test]
async fn test_creation_then_poll_until_created() {
    let (server, gateway) = common::setup_gateway(3).await;

    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(renditions("NOT_CREATED", "NOT_CREATED")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/nodes/doc/renditions"))
        .and(body_json(serde_json::json!({ "id": "pdf" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entry": { "id": "pdf", "status": "NOT_CREATED" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entry": { "id": "pdf", "status": "CREATED" }
        })))
        .mount(&server)
        .await;

    let url = gateway.rendition_url("doc").await.unwrap();
    assert!(url.unwrap().ends_with("/nodes/doc/renditions/pdf/content"));
}

#[tokio::test]
async fn test_exhausted_polling_resolves_to_none() {
    let (server, gateway) = common::setup_gateway(3).await;

    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(renditions("NOT_CREATED", "NOT_CREATED")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/nodes/doc/renditions"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nodes/doc/renditions/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entry": { "id": "pdf", "status": "NOT_CREATED" }
        })))
        .expect(3)
        .mount(&server)
        .await;

    assert_eq!(gateway.rendition_url("doc").await.unwrap(), None);
}

#[tokio::test]
async fn test_no_preferred_rendition_offered() {
    let (server, gateway) = common::setup_gateway(3).await;

    Mock::given(method("GET"))
        .and(path("/nodes/img/renditions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "list": { "entries": [ { "entry": { "id": "doclib", "status": "CREATED" } } ] }
        })))
        .mount(&server)
        .await;

    assert_eq!(gateway.rendition_url("img").await.unwrap(), None);
}
