//! OpenAI stream and completion encoding
//!
//! Converts upstream events into `chat.completion.chunk` SSE frames and a
//! batch output into a `chat.completion` object. Usage is computed locally
//! with the token counter because the upstream reports none.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    openai::{
        ChatCompletion, Choice, ChoiceMessage, Delta, Role, StreamChoice, StreamChunk, Usage,
    },
    routes::metrics::record_tokens,
    tokens::TokenCounter,
    upstream::{UpstreamEvent, UpstreamEventStream},
};

/// Identity shared by every chunk of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub id: String,
    pub model: String,
    /// Unix timestamp, seconds
    pub created: i64,
}

impl ResponseMeta {
    /// Fresh id and timestamp for a response about to start
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            model: model.into(),
            created: Utc::now().timestamp(),
        }
    }
}

/// Format a stream chunk as an SSE data event: `data: {json}\n\n`
pub fn format_sse_chunk(chunk: &StreamChunk) -> AppResult<Bytes> {
    let json = serde_json::to_string(chunk)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize chunk: {}", e)))?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// The stream termination marker: `data: [DONE]\n\n`
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    AwaitingFirstEvent,
    Emitting,
    Done,
}

/// Streaming encoder state machine
///
/// `AwaitingFirstEvent` announces the assistant role on the first event of
/// any kind, `Emitting` forwards output text, and `Done` has written the
/// usage chunk and the `[DONE]` marker.
#[derive(Debug)]
pub struct StreamEncoder {
    meta: ResponseMeta,
    state: EncoderState,
    accumulated: String,
    prompt_tokens: u32,
    system_prompt_tokens: u32,
    counter: TokenCounter,
}

impl StreamEncoder {
    pub fn new(
        meta: ResponseMeta,
        counter: TokenCounter,
        prompt_tokens: u32,
        system_prompt_tokens: u32,
    ) -> Self {
        Self {
            meta,
            state: EncoderState::AwaitingFirstEvent,
            accumulated: String::new(),
            prompt_tokens,
            system_prompt_tokens,
            counter,
        }
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    /// Whether the terminal chunk and `[DONE]` have been produced
    pub fn is_done(&self) -> bool {
        self.state == EncoderState::Done
    }

    /// Encode one upstream event into zero or more SSE frames
    pub fn on_event(&mut self, event: UpstreamEvent) -> AppResult<Vec<Bytes>> {
        let mut frames = Vec::new();

        match self.state {
            EncoderState::Done => return Ok(frames),
            EncoderState::AwaitingFirstEvent => {
                let delta = Delta {
                    role: Some(Role::Assistant),
                    content: Some(String::new()),
                };
                frames.push(format_sse_chunk(&self.chunk(delta, None, None))?);
                self.state = EncoderState::Emitting;
            }
            EncoderState::Emitting => {}
        }

        match event {
            UpstreamEvent::Output(text) => {
                self.accumulated.push_str(&text);
                let delta = Delta {
                    role: None,
                    content: Some(text),
                };
                frames.push(format_sse_chunk(&self.chunk(delta, None, None))?);
            }
            UpstreamEvent::Done => {
                let usage = self.usage();
                frames.push(format_sse_chunk(&self.chunk(
                    Delta::default(),
                    Some("stop".to_string()),
                    Some(usage),
                ))?);
                frames.push(format_sse_done());
                self.state = EncoderState::Done;

                record_tokens("prompt", usage.prompt_tokens as u64, &self.meta.model);
                record_tokens("completion", usage.completion_tokens as u64, &self.meta.model);
                info!(
                    id = %self.meta.id,
                    model = %self.meta.model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Streaming completion finished"
                );
            }
            UpstreamEvent::Other(_) => {}
        }

        Ok(frames)
    }

    fn usage(&self) -> Usage {
        Usage::new(
            self.prompt_tokens,
            self.system_prompt_tokens,
            self.counter.count_tokens(&self.accumulated),
        )
    }

    fn chunk(
        &self,
        delta: Delta,
        finish_reason: Option<String>,
        usage: Option<Usage>,
    ) -> StreamChunk {
        StreamChunk {
            id: self.meta.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
                logprobs: None,
            }],
            usage,
        }
    }
}

/// Drive an encoder over an upstream event stream
///
/// Content chunks after the first are paced by `delay`. An upstream error, or
/// the upstream ending before `Done`, ends the output with an `Err` item.
pub fn encode_stream(
    events: UpstreamEventStream,
    encoder: StreamEncoder,
    delay: Duration,
) -> impl Stream<Item = AppResult<Bytes>> + Send {
    async_stream::stream! {
        let mut events = events;
        let mut encoder = encoder;
        let mut sent_content = false;

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!(id = %encoder.meta().id, error = %e, "Upstream failed mid-stream");
                    yield Err(e);
                    return;
                }
            };

            let is_output = matches!(event, UpstreamEvent::Output(_));
            if is_output && sent_content && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match encoder.on_event(event) {
                Ok(frames) => {
                    for frame in frames {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            sent_content |= is_output;
            if encoder.is_done() {
                return;
            }
        }

        warn!(id = %encoder.meta().id, "Upstream stream closed before completion");
        yield Err(AppError::Stream("Upstream stream closed before completion".to_string()));
    }
}

/// Usage of a batch completion
pub fn completion_usage(
    counter: &TokenCounter,
    prompt: &str,
    system_prompt: &str,
    completion: &str,
) -> Usage {
    Usage::new(
        counter.count_tokens(prompt),
        counter.count_tokens(system_prompt),
        counter.count_tokens(completion),
    )
}

/// Assemble the non-streaming completion object
pub fn build_completion(meta: &ResponseMeta, content: String, usage: Usage) -> ChatCompletion {
    ChatCompletion {
        id: meta.id.clone(),
        object: "chat.completion".to_string(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: Role::Assistant,
                content,
            },
            finish_reason: Some("stop".to_string()),
            logprobs: None,
        }],
        usage,
    }
}
