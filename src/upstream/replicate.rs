//! Predictions API client
//!
//! Talks to a Replicate-compatible predictions API with a single credential.
//! Streaming predictions are created with `stream: true` and then read from
//! the returned stream URL; batch predictions use `Prefer: wait` and are
//! polled until they reach a terminal status.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    streaming::{SseDecoder, SseFrame},
};

use super::{ModelInput, Upstream, UpstreamEvent, UpstreamEventStream};

/// Prediction object returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "succeeded" | "failed" | "canceled" | "aborted"
        )
    }

    /// Still queued or running upstream
    fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "starting" | "processing")
    }
}

/// Client for one upstream credential
pub struct ReplicateClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    poll_interval: Duration,
}

impl ReplicateClient {
    /// Create a new client
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_token: api_token.into(),
            poll_interval,
        }
    }

    /// One client per configured credential, in pool order
    pub fn pool_from_config(client: &reqwest::Client, config: &Config) -> Vec<Self> {
        config
            .upstream_api_tokens
            .iter()
            .map(|token| {
                Self::new(
                    client.clone(),
                    config.upstream_api_url.clone(),
                    token.clone(),
                    config.upstream_poll_interval,
                )
            })
            .collect()
    }

    /// Build the create-prediction URL and body for a model
    ///
    /// `owner/name` targets the model's latest version; `owner/name:version`
    /// pins a version through the generic predictions endpoint.
    fn create_request(&self, model: &str, input: &ModelInput, stream: bool) -> (String, Value) {
        let mut body = json!({ "input": input });
        if stream {
            body["stream"] = Value::Bool(true);
        }

        match model.split_once(':') {
            Some((_, version)) => {
                body["version"] = Value::String(version.to_string());
                (format!("{}/predictions", self.base_url), body)
            }
            None => (format!("{}/models/{}/predictions", self.base_url, model), body),
        }
    }

    /// Create a prediction
    async fn create_prediction(
        &self,
        model: &str,
        input: &ModelInput,
        stream: bool,
    ) -> AppResult<Prediction> {
        let (url, body) = self.create_request(model, input, stream);
        debug!(url = %url, stream = stream, "Creating prediction");

        let mut headers = self.default_headers()?;
        if !stream {
            headers.insert("Prefer", HeaderValue::from_static("wait"));
        }

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        Self::parse_prediction(Self::check_status(response).await?).await
    }

    /// Fetch the current state of a prediction
    async fn get_prediction(&self, url: &str) -> AppResult<Prediction> {
        let response = self
            .client
            .get(url)
            .headers(self.default_headers()?)
            .send()
            .await?;

        Self::parse_prediction(Self::check_status(response).await?).await
    }

    /// Turn a non-2xx response into an upstream error
    async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        error!(status = %status, body = %text, "Upstream request failed");
        Err(AppError::Upstream(format!(
            "Upstream API error {}: {}",
            status, text
        )))
    }

    async fn parse_prediction(response: reqwest::Response) -> AppResult<Prediction> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, body = %body, "Failed to parse prediction");
            AppError::Upstream(format!("Failed to parse prediction: {}", e))
        })
    }

    /// Build default headers for upstream requests
    fn default_headers(&self) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_token)).map_err(|_| {
            AppError::Internal(anyhow::anyhow!(
                "Upstream API token contains invalid header characters"
            ))
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

/// Map one decoded SSE frame onto an upstream event
fn event_from_frame(frame: SseFrame) -> AppResult<UpstreamEvent> {
    match frame.event.as_str() {
        "output" => Ok(UpstreamEvent::Output(frame.data)),
        "done" => match done_reason(&frame.data) {
            Some(reason) if reason == "error" || reason == "canceled" => Err(AppError::Upstream(
                format!("Prediction ended with reason '{}'", reason),
            )),
            _ => Ok(UpstreamEvent::Done),
        },
        "error" => Err(AppError::Upstream(format!(
            "Prediction stream error: {}",
            frame.data
        ))),
        other => Ok(UpstreamEvent::Other(other.to_string())),
    }
}

/// The `reason` field of a `done` event payload, when present
fn done_reason(data: &str) -> Option<String> {
    serde_json::from_str::<Value>(data)
        .ok()?
        .get("reason")?
        .as_str()
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Upstream for ReplicateClient {
    #[instrument(skip(self, input), fields(model = %model))]
    async fn stream(&self, model: &str, input: &ModelInput) -> AppResult<UpstreamEventStream> {
        let prediction = self.create_prediction(model, input, true).await?;

        let stream_url = prediction.urls.stream.clone().ok_or_else(|| {
            AppError::Upstream(format!("Prediction {} has no stream URL", prediction.id))
        })?;
        debug!(prediction_id = %prediction.id, "Opening prediction stream");

        let mut headers = self.default_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

        let response = self.client.get(&stream_url).headers(headers).send().await?;
        let response = Self::check_status(response).await?;

        let events = async_stream::stream! {
            let bytes = response.bytes_stream();
            futures::pin_mut!(bytes);
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(AppError::Http(e));
                        return;
                    }
                };

                for frame in decoder.feed(&chunk) {
                    let event = event_from_frame(frame);
                    let failed = event.is_err();
                    yield event;
                    if failed {
                        return;
                    }
                }
            }

            if decoder.has_pending() {
                warn!("Upstream stream ended inside an unterminated event");
            }
        };

        Ok(Box::pin(events))
    }

    #[instrument(skip(self, input), fields(model = %model))]
    async fn run(&self, model: &str, input: &ModelInput) -> AppResult<Value> {
        let mut prediction = self.create_prediction(model, input, false).await?;

        while !prediction.is_terminal() {
            if !prediction.is_pending() {
                return Err(AppError::Upstream(format!(
                    "Prediction {} has unexpected status '{}'",
                    prediction.id, prediction.status
                )));
            }
            debug!(
                prediction_id = %prediction.id,
                status = %prediction.status,
                "Prediction still running, polling"
            );
            tokio::time::sleep(self.poll_interval).await;

            let url = prediction
                .urls
                .get
                .clone()
                .unwrap_or_else(|| format!("{}/predictions/{}", self.base_url, prediction.id));
            prediction = self.get_prediction(&url).await?;
        }

        if prediction.status == "succeeded" {
            return Ok(prediction.output.unwrap_or(Value::Null));
        }

        let reason = prediction
            .error
            .map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_else(|| "no error detail".to_string());
        Err(AppError::Upstream(format!(
            "Prediction {} {}: {}",
            prediction.id, prediction.status, reason
        )))
    }
}
