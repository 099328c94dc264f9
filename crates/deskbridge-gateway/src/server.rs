// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use deskbridge_core::BridgeError;
use deskbridge_core::traits::WebhookHandler;
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Webhook bodies carry the whole conversation, so the limit is generous.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub handler: Arc<dyn WebhookHandler>,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(handler: Arc<dyn WebhookHandler>) -> Self {
        Self {
            handler,
            start_time: Instant::now(),
        }
    }
}

/// Server configuration (mirrors `WebhookConfig` from deskbridge-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            max_concurrent_requests: 64,
        }
    }
}

/// Routes:
/// - POST / and POST /webhook
/// - GET /health
pub fn router(state: GatewayState, max_concurrent_requests: usize) -> Router {
    Router::new()
        .route("/", post(handlers::post_webhook))
        .route("/webhook", post(handlers::post_webhook))
        .route("/health", get(handlers::get_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests.max(1)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `cancel` fires, then finish in-flight requests.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let app = router(state, config.max_concurrent_requests);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Config(format!("failed to bind webhook listener to {addr}: {e}")))?;

    tracing::info!("webhook listener on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| BridgeError::Internal(format!("webhook server error: {e}")))?;

    tracing::info!("webhook listener stopped");
    Ok(())
}
