//! Routing integration tests
//!
//! Tests for the public endpoints, CORS handling and the 404 fallback:
//! - GET /v1/models
//! - GET /health
//! - GET /metrics
//! - OPTIONS on any path
//! - unknown paths and methods

use axum::http::{header, Method, StatusCode};
use serde_json::Value;

use crate::common::{constants::*, test_config, test_server};
use crate::mocks::MockReplicate;

#[tokio::test]
async fn test_models_list_is_public() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    let response = server.get("/v1/models").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["object"], "list");

    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["anthropic/claude-3.7-sonnet", ALT_MODEL]);

    let first = &body["data"][0];
    assert_eq!(first["object"], "model");
    assert_eq!(first["owned_by"], "anthropic");
    assert_eq!(first["root"], "anthropic/claude-3.7-sonnet");
    assert!(first["parent"].is_null());
    assert_eq!(first["permission"][0]["object"], "model_permission");
}

#[tokio::test]
async fn test_health_endpoint() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A, TOKEN_B]));

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["credentials"], 2);
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    server.get("/metrics").await.assert_status_ok();
}

#[tokio::test]
async fn test_options_preflight_returns_204() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    for path in ["/v1/chat/completions", "/v1/models", "/no/such/path"] {
        let response = server.method(Method::OPTIONS, path).await;

        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_METHODS),
            "GET, POST, OPTIONS"
        );
        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_HEADERS),
            "Content-Type, Authorization"
        );
        assert!(response.text().is_empty());
    }
}

#[tokio::test]
async fn test_cors_headers_on_regular_responses() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    let response = server.get("/v1/models").await;
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");

    let response = server.post("/v1/chat/completions").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    let response = server.get("/v1/embeddings").await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_wrong_method_is_404() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    server
        .get("/v1/chat/completions")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .post("/v1/models")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
