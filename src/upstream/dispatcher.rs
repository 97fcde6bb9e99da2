//! Resilient dispatch to the upstream API
//!
//! Both dispatch modes share one retry policy: a failed attempt takes the next
//! credential from the rotator and restarts the whole call, up to
//! `min(pool size, 3)` extra attempts. There is no backoff and no synthesized
//! fallback; when the budget is spent the last error is returned.
//!
//! A streaming call that fails after emitting events restarts from the first
//! upstream event. Events already forwarded are not retracted, so a consumer
//! can see a duplicated prefix. Resuming mid-stream would need upstream
//! support that does not exist.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    routes::metrics::record_upstream_attempt,
};

use super::{CredentialRotator, ModelInput, Upstream, UpstreamEvent, UpstreamEventStream};

/// Upper bound on extra attempts regardless of pool size
pub const MAX_RETRIES: usize = 3;

/// Dispatches model input through a rotating pool of upstream clients
pub struct Dispatcher<U> {
    rotator: Arc<CredentialRotator<U>>,
}

impl<U> Clone for Dispatcher<U> {
    fn clone(&self) -> Self {
        Self {
            rotator: Arc::clone(&self.rotator),
        }
    }
}

impl<U: Upstream + 'static> Dispatcher<U> {
    pub fn new(rotator: Arc<CredentialRotator<U>>) -> Self {
        Self { rotator }
    }

    /// Number of attempts allowed after the first one
    pub fn retry_budget(&self) -> usize {
        self.rotator.len().min(MAX_RETRIES)
    }

    /// Number of credentials behind this dispatcher
    pub fn pool_size(&self) -> usize {
        self.rotator.len()
    }

    /// Run a prediction and return its output as one string
    pub async fn dispatch_once(&self, model: &str, input: &ModelInput) -> AppResult<String> {
        let budget = self.retry_budget();
        let (mut credential, mut client) = self.rotator.next_indexed();
        let mut attempt = 0;

        loop {
            info!(model = %model, attempt, credential, "Dispatching batch prediction");

            match client.run(model, input).await {
                Ok(output) => {
                    record_upstream_attempt("success");
                    return Ok(flatten_output(output));
                }
                Err(e) => {
                    record_upstream_attempt("failure");
                    warn!(
                        model = %model,
                        attempt,
                        credential,
                        error = %e,
                        "Batch prediction failed"
                    );
                    if attempt >= budget {
                        return Err(e);
                    }
                }
            }

            attempt += 1;
            let next = self.rotator.next_indexed();
            credential = next.0;
            client = next.1;
        }
    }

    /// Stream a prediction's events
    ///
    /// The first client is taken from the rotator immediately; the upstream is
    /// contacted when the returned stream is first polled. The stream ends
    /// after `Done` or after a single `Err` item once retries are exhausted.
    pub fn dispatch_stream(&self, model: String, input: ModelInput) -> UpstreamEventStream {
        let rotator = Arc::clone(&self.rotator);
        let budget = self.retry_budget();
        let (mut credential, mut client) = rotator.next_indexed();

        Box::pin(async_stream::stream! {
            let mut attempt = 0;

            loop {
                info!(model = %model, attempt, credential, "Dispatching streaming prediction");

                let failure = match client.stream(&model, &input).await {
                    Ok(mut events) => {
                        let mut failure = None;
                        let mut done = false;

                        while let Some(item) = events.next().await {
                            match item {
                                Ok(event) => {
                                    done = event == UpstreamEvent::Done;
                                    yield Ok(event);
                                    if done {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    failure = Some(e);
                                    break;
                                }
                            }
                        }

                        if done {
                            record_upstream_attempt("success");
                            return;
                        }
                        failure.unwrap_or_else(|| {
                            AppError::Stream(
                                "Upstream stream ended without a done event".to_string(),
                            )
                        })
                    }
                    Err(e) => e,
                };

                record_upstream_attempt("failure");
                warn!(
                    model = %model,
                    attempt,
                    credential,
                    error = %failure,
                    "Streaming prediction failed"
                );

                if attempt >= budget {
                    yield Err(failure);
                    return;
                }

                attempt += 1;
                let next = rotator.next_indexed();
                credential = next.0;
                client = next.1;
            }
        })
    }
}

/// Collapse a prediction output into text
///
/// Token lists are concatenated without a separator, strings are used as-is,
/// anything else is rendered as JSON.
pub fn flatten_output(output: Value) -> String {
    match output {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
