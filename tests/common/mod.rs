//! Common test utilities
//!
//! Builds the real router against a mock upstream and provides request and
//! SSE helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum_test::TestServer;
use serde_json::{json, Value};

use replicate_bridge::{routes::create_router, AppState, Config};

/// Test configuration constants
pub mod constants {
    /// Bearer key clients present to the bridge
    pub const TEST_API_KEY: &str = "sk-bridge-test-key";
    /// Upstream credentials
    pub const TOKEN_A: &str = "r8_token_a";
    pub const TOKEN_B: &str = "r8_token_b";
    pub const TOKEN_C: &str = "r8_token_c";
    /// A non-default model that is advertised
    pub const ALT_MODEL: &str = "meta/meta-llama-3-70b-instruct";
    /// Directive used instead of the built-in one, to keep assertions readable
    pub const TEST_DIRECTIVE: &str = "Answer once.";
}

/// Build a config pointing at the mock upstream
pub fn test_config(upstream_url: &str, tokens: &[&str]) -> Config {
    test_config_with(upstream_url, tokens, &[])
}

/// Like [`test_config`], with extra or overriding variables
pub fn test_config_with(upstream_url: &str, tokens: &[&str], extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("BRIDGE_API_KEY", constants::TEST_API_KEY.to_string()),
        ("UPSTREAM_API_TOKENS", tokens.join(",")),
        ("UPSTREAM_API_URL", upstream_url.to_string()),
        ("ADVERTISED_MODELS", constants::ALT_MODEL.to_string()),
        ("ANTI_ECHO_DIRECTIVE", constants::TEST_DIRECTIVE.to_string()),
        ("STREAM_CHUNK_DELAY_MS", "0".to_string()),
        ("UPSTREAM_POLL_INTERVAL_MS", "10".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(key, value.to_string());
    }

    Config::from_lookup(|key| vars.get(key).cloned()).expect("Failed to build test config")
}

/// Start a test server over the real router
pub fn test_server(config: Config) -> TestServer {
    let state = Arc::new(AppState::new(config).expect("Failed to create app state"));
    TestServer::new(create_router(state)).expect("Failed to create test server")
}

/// Authorization value carrying the test key
pub fn bearer() -> HeaderValue {
    format!("Bearer {}", constants::TEST_API_KEY).parse().unwrap()
}

/// A minimal chat request
pub fn chat_request(stream: bool) -> Value {
    json!({
        "model": "gpt-4",
        "stream": stream,
        "messages": [
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "Say hello"}
        ]
    })
}

/// Payloads of the `data:` lines of an SSE body, in order
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

/// Parse every JSON chunk of an SSE body, stopping at `[DONE]`
pub fn sse_chunks(body: &str) -> Vec<Value> {
    sse_data(body)
        .into_iter()
        .take_while(|data| data != "[DONE]")
        .map(|data| serde_json::from_str(&data).expect("chunk is not JSON"))
        .collect()
}
