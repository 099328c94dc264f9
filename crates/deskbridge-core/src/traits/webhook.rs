// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook consumer trait implemented by the engine and called by the gateway.

use async_trait::async_trait;

use crate::desk::WebhookEvent;
use crate::error::BridgeError;

#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle_webhook(&self, event: WebhookEvent) -> Result<(), BridgeError>;
}
