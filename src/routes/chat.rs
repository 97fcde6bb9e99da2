//! Chat completions endpoint
//!
//! OpenAI-compatible chat completions API endpoint.
//! Handles both streaming and non-streaming responses.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{stream, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    normalize::normalize,
    openai::{ChatCompletionRequest, Message},
    routes::metrics::{record_request, record_tokens},
    streaming::{
        build_completion, completion_usage, encode_stream, ResponseMeta, StreamEncoder,
    },
    upstream::{ModelInput, UpstreamEventStream},
    AppState,
};

/// Turn a body extraction failure into an OpenAI-style error
fn body_rejection(rejection: BytesRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(rejection.body_text())
    } else {
        AppError::InvalidJson(rejection.body_text())
    }
}

/// Parse the raw request body
fn parse_request(body: &[u8]) -> AppResult<ChatCompletionRequest> {
    serde_json::from_slice(body).map_err(|e| AppError::InvalidJson(e.to_string()))
}

/// Validate and decode the `messages` field
fn parse_messages(messages: Option<Value>) -> AppResult<Vec<Message>> {
    let messages = match messages {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(AppError::InvalidMessages(
                "'messages' must be an array".to_string(),
            ))
        }
        None => {
            return Err(AppError::InvalidMessages(
                "'messages' is required".to_string(),
            ))
        }
    };

    if messages.is_empty() {
        return Err(AppError::InvalidMessages(
            "'messages' must not be empty".to_string(),
        ));
    }

    serde_json::from_value(Value::Array(messages))
        .map_err(|e| AppError::InvalidMessages(e.to_string()))
}

/// Chat completions handler
///
/// Normalizes the conversation into a single prompt, dispatches it to the
/// upstream model and re-encodes the result in OpenAI's format.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let start_time = Instant::now();

    let body = body.map_err(body_rejection)?;
    let request = parse_request(&body)?;
    let stream = request.is_stream();
    let max_tokens = request
        .requested_max_tokens()
        .unwrap_or(state.config.max_tokens);
    let model = state.config.resolve_model(request.model.as_deref());

    let messages = parse_messages(request.messages)?;
    let conversation = normalize(&messages, &state.config.anti_echo_directive)?;

    info!(
        model = %model,
        stream,
        messages = messages.len(),
        has_image = conversation.image_url.is_some(),
        "Processing chat completion request"
    );

    let input = ModelInput::new(conversation, max_tokens, state.config.max_image_resolution);

    let result = if stream {
        handle_streaming(&state, model.clone(), input).await
    } else {
        handle_non_streaming(&state, &model, input).await
    };

    let duration = start_time.elapsed().as_secs_f64();
    match &result {
        Ok(_) if stream => record_request("streaming", &model, duration),
        Ok(_) => record_request("success", &model, duration),
        Err(e) => {
            warn!(model = %model, error = %e, "Chat completion failed");
            record_request("error", &model, duration);
        }
    }

    result
}

/// Handle non-streaming request
async fn handle_non_streaming(
    state: &AppState,
    model: &str,
    input: ModelInput,
) -> Result<Response, AppError> {
    let start_time = Instant::now();
    let content = state.dispatcher.dispatch_once(model, &input).await?;

    let usage = completion_usage(
        &state.token_counter,
        &input.prompt,
        &input.system_prompt,
        &content,
    );
    record_tokens("prompt", usage.prompt_tokens as u64, model);
    record_tokens("completion", usage.completion_tokens as u64, model);

    info!(
        model = %model,
        duration_ms = %format!("{:.2}", start_time.elapsed().as_secs_f64() * 1000.0),
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "Chat completion finished"
    );

    let completion = build_completion(&ResponseMeta::new(model), content, usage);
    Ok((StatusCode::OK, Json(completion)).into_response())
}

/// Handle streaming request
///
/// The first upstream item is awaited before any header is sent, so a
/// request whose every attempt fails still gets a JSON error response.
async fn handle_streaming(
    state: &AppState,
    model: String,
    input: ModelInput,
) -> Result<Response, AppError> {
    let prompt_tokens = state.token_counter.count_tokens(&input.prompt);
    let system_prompt_tokens = state.token_counter.count_tokens(&input.system_prompt);

    let mut events = state.dispatcher.dispatch_stream(model.clone(), input);
    let first = match events.next().await {
        Some(Ok(event)) => event,
        Some(Err(e)) => return Err(e),
        None => {
            return Err(AppError::Stream(
                "Upstream stream closed before any event".to_string(),
            ))
        }
    };
    let events: UpstreamEventStream =
        Box::pin(stream::once(async move { Ok(first) }).chain(events));

    let encoder = StreamEncoder::new(
        ResponseMeta::new(model),
        state.token_counter.clone(),
        prompt_tokens,
        system_prompt_tokens,
    );
    let body = Body::from_stream(encode_stream(
        events,
        encoder,
        state.config.stream_chunk_delay,
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
