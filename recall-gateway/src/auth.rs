//! Shared-secret authentication for Recall Gateway.
//!
//! Every memory route requires the configured header (default `X-Auth`) to
//! carry the configured token.

use crate::routes::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::Response,
};
use recall_common::config::AuthConfig;
use recall_common::Error;
use std::sync::Arc;

/// Authentication state shared across requests.
#[derive(Clone)]
pub struct AuthState {
    header: HeaderName,
    token: Option<Arc<str>>,
}

impl AuthState {
    /// Build from config. An empty or invalid header name falls back to `X-Auth`;
    /// a missing token admits every request.
    pub fn from_config(config: &AuthConfig) -> Self {
        let header = HeaderName::try_from(config.header.trim())
            .unwrap_or_else(|_| HeaderName::from_static("x-auth"));
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(Arc::from);
        Self { header, token }
    }

    /// Check a presented credential.
    pub fn verify(&self, presented: Option<&str>) -> bool {
        match &self.token {
            None => true,
            Some(expected) => {
                presented.is_some_and(|p| constant_time_eq(p.as_bytes(), expected.as_bytes()))
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(&auth.header)
        .and_then(|h| h.to_str().ok());

    if !auth.verify(presented) {
        tracing::warn!(
            path = %request.uri().path(),
            header_present = presented.is_some(),
            "Rejected unauthenticated request"
        );
        return Err(ApiError(Error::Auth("Unauthorized".into())));
    }

    Ok(next.run(request).await)
}
