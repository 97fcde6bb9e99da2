//! Replicate Bridge - OpenAI-compatible gateway for hosted model predictions
//!
//! Accepts OpenAI chat completion requests, flattens the conversation into a
//! single prompt, runs it on a predictions API through a rotating pool of
//! credentials, and answers in OpenAI's JSON or SSE format.

pub mod config;
pub mod error;
pub mod middleware;
pub mod normalize;
pub mod openai;
pub mod routes;
pub mod streaming;
pub mod tokens;
pub mod upstream;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};
pub use crate::tokens::TokenCounter;
pub use crate::upstream::{CredentialRotator, Dispatcher, ReplicateClient};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub start_time: Instant,
    /// Retrying dispatcher over the credential pool
    pub dispatcher: Dispatcher<ReplicateClient>,
    /// Token counter for usage reporting
    pub token_counter: TokenCounter,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        // No request timeout: streams stay open as long as the model generates
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .build()?;

        let clients = ReplicateClient::pool_from_config(&http_client, &config);
        let rotator = Arc::new(CredentialRotator::new(clients)?);
        let dispatcher = Dispatcher::new(rotator);

        let token_counter = TokenCounter::new()?;

        Ok(Self {
            config,
            start_time: Instant::now(),
            dispatcher,
            token_counter,
        })
    }
}
