//! Route definitions for Recall Gateway.
//!
//! Memory endpoints (authenticated) and a health check (open).

use crate::auth::{auth_middleware, AuthState};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use recall_common::logging::generate_trace_id;
use recall_common::{request_span, Error};
use recall_memory::{Memory, MemoryEntry, MemoryStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<dyn Memory>,
    /// `k` used when a semantic query omits it
    pub default_k: usize,
}

/// Body of `POST /memory/add`.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub role: String,
    pub content: String,
}

/// Status envelope used for acknowledgements and errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub backend: String,
    pub stats: MemoryStats,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub last: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SemanticParams {
    pub query: Option<String>,
    pub k: Option<String>,
}

/// Handler error, rendered as an `ApiResponse` with the matching status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiResponse::error(self.0.client_message()))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(Error::InvalidInput(message.into()))
}

/// Build the memory routes behind the shared-secret check.
pub fn memory_routes(state: AppState, auth: AuthState) -> Router {
    Router::new()
        .route("/memory/add", post(add_handler))
        .route("/memory/retrieve/recent", get(recent_handler))
        .route("/memory/retrieve/semantic", get(semantic_handler))
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state)
}

/// Build health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Wrap every request in a span carrying a fresh trace id.
pub async fn trace_requests(request: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    let span = request_span!(
        "http_request",
        trace_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    async move {
        let response = next.run(request).await;
        tracing::debug!(status = response.status().as_u16(), "Request finished");
        response
    }
    .instrument(span)
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn add_handler(
    State(state): State<AppState>,
    payload: Result<Json<AddRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    state.memory.add(&request.role, &request.content).await;
    Ok(Json(ApiResponse::success("Memory entry added")))
}

async fn recent_handler(
    State(state): State<AppState>,
    params: Result<Query<RecentParams>, QueryRejection>,
) -> Result<Json<Vec<MemoryEntry>>, ApiError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let n = match params.last.as_deref() {
        None => usize::MAX,
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| bad_request("'last' must be a non-negative integer"))?,
    };

    Ok(Json(state.memory.retrieve_recent(n).await))
}

async fn semantic_handler(
    State(state): State<AppState>,
    params: Result<Query<SemanticParams>, QueryRejection>,
) -> Result<Json<Vec<MemoryEntry>>, ApiError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let query = params
        .query
        .ok_or_else(|| bad_request("Missing 'query' parameter"))?;

    let k = match params.k.as_deref() {
        None => state.default_k,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(k) if k > 0 => k,
            _ => return Err(bad_request("'k' must be a positive integer")),
        },
    };

    Ok(Json(state.memory.retrieve_relevant(&query, k).await))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let healthy = state.memory.health_check().await;
    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "recall-gateway".into(),
        backend: state.memory.name().into(),
        stats: state.memory.stats().await,
    })
}
