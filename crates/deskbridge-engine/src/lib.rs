// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronization engine for deskbridge.
//!
//! The [`Engine`] receives protocol room events from the sync loop and desk
//! webhooks from the gateway, and translates each into the other side while
//! keeping the identity store's links current.

pub mod attachments;
pub mod background;
pub mod context;
pub mod desk_inbound;
pub mod lifecycle;
pub mod locks;
pub mod markup;
pub mod protocol_inbound;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskbridge_core::desk::WebhookEvent;
use deskbridge_core::event::RoomEvent;
use deskbridge_core::traits::WebhookHandler;
use deskbridge_core::BridgeError;
use tracing::{debug, info, warn};

pub use context::{BridgeContext, EngineSettings};

/// Entry point for both translation directions.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<BridgeContext>,
}

impl Engine {
    pub fn new(ctx: BridgeContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    /// Translate one protocol room event into the desk.
    pub async fn handle_room_event(&self, event: RoomEvent) -> Result<(), BridgeError> {
        protocol_inbound::handle_room_event(&self.ctx, event).await
    }

    /// Re-publish the conversation ID state event for every linked room.
    pub async fn backfill_conversation_state(&self) -> Result<usize, BridgeError> {
        let links = self.ctx.store.all_links().await?;
        info!(rooms = links.len(), "backfilling conversation ID state events");
        for link in &links {
            lifecycle::publish_conversation_state(&self.ctx, &link.room_id, link.conversation_id)
                .await;
        }
        Ok(links.len())
    }

    /// Stop accepting background work and wait up to `timeout` for it to finish.
    ///
    /// Returns `false` when tasks were still running at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.ctx.tasks.close();
        let pending = self.ctx.tasks.len();
        if pending > 0 {
            info!(pending, "waiting for background tasks");
        }
        match tokio::time::timeout(timeout, self.ctx.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(pending = self.ctx.tasks.len(), "background tasks still running at shutdown");
                false
            }
        }
    }
}

#[async_trait]
impl WebhookHandler for Engine {
    async fn handle_webhook(&self, event: WebhookEvent) -> Result<(), BridgeError> {
        match event {
            WebhookEvent::MessageCreated(message) | WebhookEvent::MessageUpdated(message) => {
                desk_inbound::handle_message_event(&self.ctx, &message).await
            }
            WebhookEvent::ConversationStatusChanged(change) => {
                desk_inbound::handle_status_changed(&self.ctx, &change).await
            }
            WebhookEvent::Unrecognized => {
                debug!("ignoring unrecognized webhook event");
                Ok(())
            }
        }
    }
}
