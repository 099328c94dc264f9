// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the webhook receiver.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use deskbridge_core::desk::WebhookEvent;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /webhook
///
/// Bodies that do not parse are rejected with 400. Anything else is handled
/// before responding, and answered with 200 even when handling failed so the
/// desk does not redeliver; failures are already reported in the conversation.
pub async fn post_webhook(State(state): State<GatewayState>, body: Bytes) -> Response {
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "rejecting malformed webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("malformed webhook body: {e}"),
                }),
            )
                .into_response();
        }
    };

    debug!(event = event_name(&event), "received webhook");
    if let Err(e) = state.handler.handle_webhook(event).await {
        error!(error = %e, "webhook handling failed");
    }
    StatusCode::OK.into_response()
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

fn event_name(event: &WebhookEvent) -> &'static str {
    match event {
        WebhookEvent::MessageCreated(_) => "message_created",
        WebhookEvent::MessageUpdated(_) => "message_updated",
        WebhookEvent::ConversationStatusChanged(_) => "conversation_status_changed",
        WebhookEvent::Unrecognized => "unrecognized",
    }
}
