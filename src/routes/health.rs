//! Health check endpoint

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    /// Size of the upstream credential pool
    pub credentials: usize,
}

/// Health check endpoint
///
/// Upstream credentials are not probed.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        credentials: state.dispatcher.pool_size(),
    })
}
