//! Request validation integration tests

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use crate::common::{bearer, constants::*, test_config, test_server};
use crate::mocks::MockReplicate;

async fn assert_bad_request(body: Value, code: &str) {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    let response = server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, bearer())
        .json(&body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["error"]["code"], code, "body: {}", body);
    assert_eq!(error["error"]["type"], "invalid_request_error");
    assert!(upstream.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_malformed_json() {
    let upstream = MockReplicate::start().await;
    let server = test_server(test_config(&upstream.uri(), &[TOKEN_A]));

    let response = server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, bearer())
        .text("{\"messages\": [")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["error"]["code"], "invalid_json");
}

#[tokio::test]
async fn test_missing_messages() {
    assert_bad_request(json!({"model": "gpt-4"}), "invalid_messages").await;
}

#[tokio::test]
async fn test_messages_not_an_array() {
    assert_bad_request(json!({"messages": "hello"}), "invalid_messages").await;
}

#[tokio::test]
async fn test_empty_messages() {
    assert_bad_request(json!({"messages": []}), "invalid_messages").await;
}

#[tokio::test]
async fn test_unknown_role() {
    assert_bad_request(
        json!({"messages": [{"role": "tool", "content": "x"}]}),
        "invalid_messages",
    )
    .await;
}

#[tokio::test]
async fn test_only_system_messages() {
    assert_bad_request(
        json!({"messages": [{"role": "system", "content": "be nice"}]}),
        "invalid_messages",
    )
    .await;
}

#[tokio::test]
async fn test_whitespace_only_content() {
    assert_bad_request(
        json!({"messages": [{"role": "user", "content": "   \n"}]}),
        "invalid_messages",
    )
    .await;
}
