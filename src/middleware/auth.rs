//! Authentication middleware
//!
//! Checks the bearer key of protected routes against the configured API key.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::{error::AppError, AppState};

/// Return the token of a `Bearer` authorization value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// SHA-256 digest of a key, hex encoded
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a presented key matches the configured one, by SHA-256 digest
pub fn key_matches(presented: &str, expected: &str) -> bool {
    hash_key(presented) == hash_key(expected)
}

/// Authentication middleware
///
/// Rejects the request with a 401 when the `Authorization` header is
/// missing, does not use the `Bearer` scheme, or carries the wrong key.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AppError::MissingAuthHeader)?;

    let token = auth_header
        .to_str()
        .ok()
        .and_then(extract_bearer_token)
        .ok_or_else(|| {
            warn!("Authorization header without Bearer scheme");
            AppError::InvalidAuthHeader
        })?;

    if !key_matches(token, &state.config.api_key) {
        warn!("Invalid API key presented");
        return Err(AppError::InvalidAuthKey);
    }

    debug!("Request authenticated");
    Ok(next.run(request).await)
}
