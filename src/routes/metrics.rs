//! Prometheus metrics endpoint
//!
//! Exposes request, token and upstream counters in Prometheus text format.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::warn;

/// Global Prometheus handle for metrics export
///
/// `None` when another recorder was installed first, e.g. by a test binary.
static PROMETHEUS_HANDLE: Lazy<Option<PrometheusHandle>> = Lazy::new(|| {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    }
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    Lazy::force(&PROMETHEUS_HANDLE);
    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "bridge_requests_total",
        "Total number of chat completion requests"
    );
    metrics::describe_histogram!(
        "bridge_request_duration_seconds",
        "Chat completion request duration in seconds"
    );
    metrics::describe_counter!("bridge_tokens_total", "Tokens counted, by type");
    metrics::describe_counter!(
        "bridge_upstream_attempts_total",
        "Upstream attempts, by result"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record a finished request
pub fn record_request(status: &str, model: &str, duration_secs: f64) {
    metrics::counter!(
        "bridge_requests_total",
        "status" => status.to_string(),
        "model" => model.to_string()
    )
    .increment(1);
    metrics::histogram!("bridge_request_duration_seconds", "model" => model.to_string())
        .record(duration_secs);
}

/// Record counted tokens
pub fn record_tokens(token_type: &str, count: u64, model: &str) {
    metrics::counter!(
        "bridge_tokens_total",
        "type" => token_type.to_string(),
        "model" => model.to_string()
    )
    .increment(count);
}

/// Record one upstream attempt, `result` being `success` or `failure`
pub fn record_upstream_attempt(result: &str) {
    metrics::counter!("bridge_upstream_attempts_total", "result" => result.to_string())
        .increment(1);
}
