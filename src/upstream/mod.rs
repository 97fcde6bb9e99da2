//! Upstream model API
//!
//! The predictions API client, the credential rotator and the dispatcher that
//! retries across credentials.

pub mod dispatcher;
pub mod replicate;
pub mod rotator;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::{error::AppResult, normalize::NormalizedConversation};

pub use dispatcher::Dispatcher;
pub use replicate::ReplicateClient;
pub use rotator::CredentialRotator;

/// Input schema of the upstream model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelInput {
    pub prompt: String,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub max_tokens: u32,
    pub max_image_resolution: f64,
}

impl ModelInput {
    pub fn new(
        conversation: NormalizedConversation,
        max_tokens: u32,
        max_image_resolution: f64,
    ) -> Self {
        Self {
            prompt: conversation.prompt,
            system_prompt: conversation.system_prompt,
            image: conversation.image_url,
            max_tokens,
            max_image_resolution,
        }
    }
}

/// One event of the upstream output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A piece of generated text
    Output(String),
    /// Generation finished
    Done,
    /// Any other event type, ignored by consumers
    Other(String),
}

/// Stream of upstream events; an `Err` item ends the stream
pub type UpstreamEventStream = Pin<Box<dyn Stream<Item = AppResult<UpstreamEvent>> + Send>>;

/// A client bound to one upstream credential
///
/// Implementations never fall back or retry on their own; that is the
/// dispatcher's job.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Start a streaming prediction and return its event stream
    async fn stream(&self, model: &str, input: &ModelInput) -> AppResult<UpstreamEventStream>;

    /// Run a prediction to completion and return its raw output
    async fn run(&self, model: &str, input: &ModelInput) -> AppResult<serde_json::Value>;
}
