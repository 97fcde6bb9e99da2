//! HTTP routes for the bridge
//!
//! This module defines all HTTP endpoints exposed by the service.

pub mod chat;
pub mod health;
pub mod metrics;
pub mod models;

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer,
};
use tracing::error;

use crate::{
    error::AppError,
    middleware::{auth::auth_middleware, cors::cors_middleware},
    AppState,
};

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_body_bytes;

    // Only matched methods are authenticated; other methods fall through to 404
    let chat = post(chat::chat_completions)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .fallback(not_found);

    Router::new()
        .route("/v1/chat/completions", chat)
        .route("/v1/models", get(models::list_models).fallback(not_found))
        .route("/health", get(health::health_check).fallback(not_found))
        .route("/metrics", get(metrics::prometheus_metrics).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Outermost, so preflights never reach routing or auth
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

/// Fallback for unknown paths and unsupported methods
async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

/// Convert a handler panic into an `internal_error` response
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = %detail, "Request handler panicked");

    AppError::Internal(anyhow::anyhow!("handler panicked")).into_response()
}
