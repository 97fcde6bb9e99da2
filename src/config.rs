//! Configuration management for the bridge
//!
//! Configuration is loaded from environment variables.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Instruction appended to the prompt and system prompt so the model answers
/// once instead of writing both sides of a transcript.
pub const DEFAULT_ANTI_ECHO_DIRECTIVE: &str = "请直接、完整地回答上面的最后一个问题，只回答一次。不要模拟多轮对话，不要自行生成以“user:”、“assistant:”或“system:”开头的内容。";

/// Upstream model used when a request names no advertised model
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.7-sonnet";

pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_MAX_IMAGE_RESOLUTION: f64 = 0.5;

/// Request bodies carry inline base64 images, so the limit is well above axum's 2 MB
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Bearer key clients must present
    pub api_key: String,
    /// Largest accepted request body, in bytes
    pub max_body_bytes: usize,

    /// Upstream predictions API base URL
    pub upstream_api_url: String,
    /// Upstream credential pool, in rotation order
    pub upstream_api_tokens: Vec<String>,
    /// Interval between polls of a batch prediction that is still running
    pub upstream_poll_interval: Duration,

    /// Model used when the request does not name an advertised one
    pub default_model: String,
    /// Models listed by `/v1/models` and accepted in requests
    pub advertised_models: Vec<String>,

    /// Upstream `max_tokens` unless the request overrides it
    pub max_tokens: u32,
    /// Upstream `max_image_resolution`
    pub max_image_resolution: f64,
    /// Directive appended to prompts to stop the model echoing the transcript
    pub anti_echo_directive: String,

    /// Pause between successive SSE content chunks
    pub stream_chunk_delay: Duration,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let upstream_api_tokens = split_list(
            &lookup("UPSTREAM_API_TOKENS").context("UPSTREAM_API_TOKENS must be set")?,
        );
        if upstream_api_tokens.is_empty() {
            bail!("UPSTREAM_API_TOKENS must contain at least one token");
        }

        let default_model = lookup("DEFAULT_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut advertised_models = lookup("ADVERTISED_MODELS")
            .map(|v| split_list(&v))
            .unwrap_or_default();
        if !advertised_models.contains(&default_model) {
            advertised_models.insert(0, default_model.clone());
        }

        let api_key = lookup("BRIDGE_API_KEY").context("BRIDGE_API_KEY must be set")?;
        if api_key.is_empty() {
            bail!("BRIDGE_API_KEY must not be empty");
        }

        Ok(Self {
            host: lookup("BRIDGE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("BRIDGE_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("Invalid BRIDGE_PORT")?,

            api_key,
            max_body_bytes: lookup("BRIDGE_MAX_BODY_BYTES")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("Invalid BRIDGE_MAX_BODY_BYTES")?
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),

            upstream_api_url: lookup("UPSTREAM_API_URL")
                .unwrap_or_else(|| "https://api.replicate.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            upstream_api_tokens,
            upstream_poll_interval: Duration::from_millis(
                lookup("UPSTREAM_POLL_INTERVAL_MS")
                    .unwrap_or_else(|| "500".to_string())
                    .parse()
                    .context("Invalid UPSTREAM_POLL_INTERVAL_MS")?,
            ),

            default_model,
            advertised_models,

            max_tokens: lookup("MAX_TOKENS")
                .map(|v| v.parse::<u32>())
                .transpose()
                .context("Invalid MAX_TOKENS")?
                .unwrap_or(DEFAULT_MAX_TOKENS),
            max_image_resolution: lookup("MAX_IMAGE_RESOLUTION")
                .map(|v| v.parse::<f64>())
                .transpose()
                .context("Invalid MAX_IMAGE_RESOLUTION")?
                .unwrap_or(DEFAULT_MAX_IMAGE_RESOLUTION),
            anti_echo_directive: lookup("ANTI_ECHO_DIRECTIVE")
                .unwrap_or_else(|| DEFAULT_ANTI_ECHO_DIRECTIVE.to_string()),

            stream_chunk_delay: Duration::from_millis(
                lookup("STREAM_CHUNK_DELAY_MS")
                    .unwrap_or_else(|| "5".to_string())
                    .parse()
                    .context("Invalid STREAM_CHUNK_DELAY_MS")?,
            ),

            log_json: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    /// Resolve the upstream model for a requested model name
    ///
    /// Unknown or missing names fall back to the default model.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(name) if self.advertised_models.iter().any(|m| m == name) => name.to_string(),
            _ => self.default_model.clone(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
