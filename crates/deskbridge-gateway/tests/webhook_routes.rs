// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use deskbridge_core::BridgeError;
use deskbridge_core::desk::WebhookEvent;
use deskbridge_core::traits::WebhookHandler;
use deskbridge_gateway::{GatewayState, router};
use serde_json::json;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<WebhookEvent>>,
    fail: bool,
}

#[async_trait]
impl WebhookHandler for RecordingHandler {
    async fn handle_webhook(&self, event: WebhookEvent) -> Result<(), BridgeError> {
        self.events.lock().unwrap().push(event);
        if self.fail {
            return Err(BridgeError::desk("desk unavailable"));
        }
        Ok(())
    }
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn status_changed() -> String {
    json!({"event": "conversation_status_changed", "id": 5, "status": "open"}).to_string()
}

#[tokio::test]
async fn webhook_is_handled_on_both_paths() {
    let handler = Arc::new(RecordingHandler::default());
    let app = router(GatewayState::new(handler.clone()), 4);

    let root = app.clone().oneshot(post("/", status_changed())).await.unwrap();
    assert_eq!(root.status(), StatusCode::OK);
    let named = app.oneshot(post("/webhook", status_changed())).await.unwrap();
    assert_eq!(named.status(), StatusCode::OK);

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], WebhookEvent::ConversationStatusChanged(_)));
}

#[tokio::test]
async fn malformed_body_is_rejected_without_handling() {
    let handler = Arc::new(RecordingHandler::default());
    let app = router(GatewayState::new(handler.clone()), 4);

    let response = app.oneshot(post("/webhook", "{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("malformed webhook body"));
    assert!(handler.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn handler_failure_still_acknowledges() {
    let handler = Arc::new(RecordingHandler {
        fail: true,
        ..RecordingHandler::default()
    });
    let app = router(GatewayState::new(handler.clone()), 4);

    let response = app.oneshot(post("/", status_changed())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handler.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_event_types_are_accepted() {
    let handler = Arc::new(RecordingHandler::default());
    let app = router(GatewayState::new(handler.clone()), 4);

    let body = json!({"event": "contact_created", "id": 1}).to_string();
    let response = app.oneshot(post("/", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handler.events.lock().unwrap()[0], WebhookEvent::Unrecognized);
}

#[tokio::test]
async fn health_reports_version() {
    let app = router(GatewayState::new(Arc::new(RecordingHandler::default())), 4);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
