// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room provisioning through an external start-new-chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use deskbridge_core::desk::Contact;
use deskbridge_core::error::BridgeError;
use deskbridge_core::traits::RoomProvisioner;
use deskbridge_core::types::OwnedRoomId;
use reqwest::Url;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
struct StartNewChatResponse {
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts the conversation's contact to an endpoint that creates a room for it.
///
/// The endpoint answers `200` with `{"room_id": "..."}` on success and any
/// other status with `{"error": "..."}`.
#[derive(Debug, Clone)]
pub struct StartNewChatProvisioner {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl StartNewChatProvisioner {
    pub fn new(endpoint: &str, token: impl Into<String>) -> Result<Self, BridgeError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            BridgeError::Config(format!("invalid start-new-chat endpoint {endpoint:?}: {e}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BridgeError::Desk {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            endpoint,
            token: token.into(),
        })
    }
}

#[async_trait]
impl RoomProvisioner for StartNewChatProvisioner {
    async fn provision_room(&self, contact: &Contact) -> Result<OwnedRoomId, BridgeError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(contact)
            .send()
            .await
            .map_err(|e| BridgeError::Desk {
                message: format!("start new chat: {e}"),
                status: e.status().map(|s| s.as_u16()),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: StartNewChatResponse = serde_json::from_str(&body).unwrap_or_default();
        let error = parsed.error.unwrap_or_default();

        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), %error, "failed to create new chat");
            return Err(BridgeError::Desk {
                message: format!("failed to create new chat: {error}"),
                status: Some(status.as_u16()),
                source: None,
            });
        }

        let Some(room_id) = parsed.room_id.filter(|r| !r.is_empty()) else {
            warn!(%error, "invalid start new chat response");
            return Err(BridgeError::Validation(format!(
                "invalid start new chat response: {error}"
            )));
        };
        let room_id = OwnedRoomId::try_from(room_id.as_str()).map_err(|e| {
            BridgeError::Validation(format!("start new chat returned bad room ID {room_id:?}: {e}"))
        })?;

        info!(%room_id, contact_id = %contact.id, "created new chat for conversation");
        Ok(room_id)
    }
}
