//! Mock predictions API for testing
//!
//! Provides wiremock-based mocks for the Replicate-style endpoints the bridge
//! talks to:
//! - POST /models/{owner}/{name}/predictions - Create a prediction
//! - GET /predictions/{id} - Poll a prediction
//! - GET /stream/{id} - Server-sent output events
//!
//! Every mock is bound to one bearer token so tests can tell which credential
//! of the pool served a request.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::mocks::replicate::MockReplicate;
//!
//! #[tokio::test]
//! async fn test_with_replicate_mock() {
//!     let upstream = MockReplicate::start().await;
//!     upstream.mock_batch_success("r8_token", json!(["Hel", "lo"])).await;
//!
//!     // Use upstream.uri() as UPSTREAM_API_URL
//! }
//! ```

use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, header, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

/// Matches the create-prediction endpoint of any model
const CREATE_PREDICTION_PATH: &str = r"^/models/[^/]+/[^/]+/predictions$";

/// Mock predictions API server wrapper
pub struct MockReplicate {
    server: MockServer,
}

impl MockReplicate {
    /// Start a new mock server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the mock server URI
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Get all received requests (for assertion in tests)
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Create-prediction requests sent with the given token
    pub async fn create_requests_for(&self, token: &str) -> Vec<wiremock::Request> {
        let expected = format!("Bearer {}", token);
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.method.as_str() == "POST")
            .filter(|r| {
                r.headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some(expected.as_str())
            })
            .collect()
    }

    fn prediction(&self, id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "status": status,
            "output": null,
            "error": null,
            "urls": {
                "get": format!("{}/predictions/{}", self.uri(), id),
                "stream": format!("{}/stream/{}", self.uri(), id),
                "cancel": format!("{}/predictions/{}/cancel", self.uri(), id)
            }
        })
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    // =========================================================================
    // Streaming predictions
    // =========================================================================

    /// Mock a streaming prediction whose stream emits the given `(event, data)` frames
    pub async fn mock_stream(&self, token: &str, events: &[(&str, &str)]) {
        self.mock_stream_for_path(token, CREATE_PREDICTION_PATH, events)
            .await;
    }

    /// Like [`mock_stream`](Self::mock_stream), for one create-prediction path regex
    pub async fn mock_stream_for_path(
        &self,
        token: &str,
        path_pattern: &str,
        events: &[(&str, &str)],
    ) {
        let id = format!("stream-{}", token);

        Mock::given(method("POST"))
            .and(path_regex(path_pattern))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(self.prediction(&id, "starting")),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/stream/{}", id)))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .and(header("Accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format_sse_events(events), "text/event-stream")
                    .insert_header("Cache-Control", "no-store"),
            )
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // Batch predictions
    // =========================================================================

    /// Mock a prediction that has already succeeded when created
    pub async fn mock_batch_success(&self, token: &str, output: Value) {
        self.mock_batch_matching(token, json!({}), output).await;
    }

    /// Mock a succeeding prediction whose create body must contain `partial_body`
    pub async fn mock_batch_matching(&self, token: &str, partial_body: Value, output: Value) {
        let mut prediction = self.prediction(&format!("batch-{}", token), "succeeded");
        prediction["output"] = output;

        Mock::given(method("POST"))
            .and(path_regex(CREATE_PREDICTION_PATH))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .and(header("Prefer", "wait"))
            .and(body_partial_json(partial_body))
            .respond_with(ResponseTemplate::new(201).set_body_json(prediction))
            .mount(&self.server)
            .await;
    }

    /// Mock a prediction still running when created, succeeding on the first poll
    pub async fn mock_batch_polled(&self, token: &str, output: Value) {
        let id = format!("polled-{}", token);

        Mock::given(method("POST"))
            .and(path_regex(CREATE_PREDICTION_PATH))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .and(header("Prefer", "wait"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(self.prediction(&id, "processing")),
            )
            .mount(&self.server)
            .await;

        let mut done = self.prediction(&id, "succeeded");
        done["output"] = output;

        Mock::given(method("GET"))
            .and(path(format!("/predictions/{}", id)))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(done))
            .mount(&self.server)
            .await;
    }

    /// Mock a prediction that ends in `failed`
    pub async fn mock_batch_failed(&self, token: &str, error: &str) {
        let mut prediction = self.prediction(&format!("failed-{}", token), "failed");
        prediction["error"] = json!(error);

        Mock::given(method("POST"))
            .and(path_regex(CREATE_PREDICTION_PATH))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(prediction))
            .mount(&self.server)
            .await;
    }

    /// Mock a create-prediction response with an arbitrary body
    pub async fn mock_batch_raw(&self, token: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path_regex(CREATE_PREDICTION_PATH))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .and(header("Prefer", "wait"))
            .respond_with(ResponseTemplate::new(201).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// Mock every create-prediction call with this token failing with `status`
    pub async fn mock_create_error(&self, token: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path_regex(CREATE_PREDICTION_PATH))
            .and(header("Authorization", Self::bearer(token).as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "title": "Unauthenticated",
                "detail": "You did not pass a valid authentication token",
                "status": status
            })))
            .mount(&self.server)
            .await;
    }
}

/// Format `(event, data)` pairs as an SSE body
pub fn format_sse_events(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .enumerate()
        .map(|(i, (event, data))| format!("event: {}\nid: {}\ndata: {}\n\n", event, i, data))
        .collect()
}
