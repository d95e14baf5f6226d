//! Recall Gateway - HTTP transport for the Recall memory store.
//!
//! ```text
//! Client → Gateway (trace → CORS → auth) → MemoryStore
//!                                            ↓
//!                              Flusher → index blob + entries JSON
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod auth;
pub mod routes;

use auth::AuthState;
use axum::{middleware, Router};
use recall_common::config::Config;
use recall_memory::Memory;
use routes::AppState;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the gateway router with all routes and middleware.
pub fn build_router(config: &Config, memory: Arc<dyn Memory>) -> Router {
    let state = AppState {
        memory,
        default_k: config.retrieval.default_k.max(1),
    };
    let auth = AuthState::from_config(&config.auth);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave room for a slow embedding call inside the request.
    let request_timeout = Duration::from_secs(config.embedding.timeout_secs.saturating_add(30));

    Router::new()
        .merge(routes::memory_routes(state.clone(), auth))
        .merge(routes::health_routes(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(middleware::from_fn(routes::trace_requests))
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn start_server<F>(
    config: &Config,
    memory: Arc<dyn Memory>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let router = build_router(config, memory);

    tracing::info!("Starting Recall Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down"),
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "SIGTERM handler unavailable, using Ctrl+C only"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
