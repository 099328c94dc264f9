// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` assembles an [`Engine`] over mock collaborators and an
//! in-memory identity store, with millisecond retry backoff.

use std::sync::Arc;
use std::time::Duration;

use deskbridge_core::BridgeError;
use deskbridge_core::desk::WebhookEvent;
use deskbridge_core::event::{RawEvent, RoomEvent};
use deskbridge_core::traits::{DeskClient, ProtocolClient, RoomProvisioner, WebhookHandler};
use deskbridge_core::types::{OwnedRoomId, OwnedUserId, RoomId, UserId};
use deskbridge_engine::{BridgeContext, Engine, EngineSettings};
use deskbridge_resilience::{CancellationToken, RetryPolicy};
use deskbridge_storage::IdentityStore;
use serde_json::Value;

use crate::mock_desk::MockDesk;
use crate::mock_protocol::MockProtocol;
use crate::mock_provisioner::MockProvisioner;

pub const BOT: &str = "@deskbridge:mock.test";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    settings: EngineSettings,
    desk: MockDesk,
    provisioned_room: Option<OwnedRoomId>,
    max_attempts: u32,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            settings: EngineSettings {
                canonical_dm_label_delay: Duration::from_millis(10),
                ..EngineSettings::default()
            },
            desk: MockDesk::new(),
            provisioned_room: None,
            max_attempts: 3,
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_desk(mut self, desk: MockDesk) -> Self {
        self.desk = desk;
        self
    }

    /// Enable start-new-chat provisioning, answering every request with `room_id`.
    pub fn with_provisioned_room(mut self, room_id: &RoomId) -> Self {
        self.provisioned_room = Some(room_id.to_owned());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn build(self) -> Result<TestHarness, BridgeError> {
        let bot = UserId::parse(BOT).map_err(|e| BridgeError::Internal(e.to_string()))?;
        let protocol = Arc::new(MockProtocol::new(bot));
        let desk = Arc::new(self.desk);
        let provisioner = self.provisioned_room.map(|room| Arc::new(MockProvisioner::new(room)));
        let store = IdentityStore::open_in_memory().await?;
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::new(self.max_attempts, Duration::from_millis(1), cancel.clone());

        let ctx = BridgeContext::new(
            protocol.clone() as Arc<dyn ProtocolClient>,
            desk.clone() as Arc<dyn DeskClient>,
            provisioner.clone().map(|p| p as Arc<dyn RoomProvisioner>),
            store.clone(),
            retry,
            self.settings,
        );

        Ok(TestHarness {
            engine: Engine::new(ctx),
            protocol,
            desk,
            provisioner,
            store,
            cancel,
        })
    }
}

/// A complete engine over mocks.
pub struct TestHarness {
    pub engine: Engine,
    pub protocol: Arc<MockProtocol>,
    pub desk: Arc<MockDesk>,
    pub provisioner: Option<Arc<MockProvisioner>>,
    pub store: IdentityStore,
    pub cancel: CancellationToken,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, BridgeError> {
        Self::builder().build().await
    }

    pub fn bot(&self) -> OwnedUserId {
        self.protocol.bot_user_id().to_owned()
    }

    /// Register `room_id` as a DM between the bot and `user`.
    pub async fn dm(&self, room_id: &RoomId, user: &UserId) {
        let bot = self.bot();
        self.protocol.set_members(room_id, &[&bot, user]).await;
    }

    /// Parse a raw timeline event and hand it to the engine.
    pub async fn room_event(&self, room_id: &RoomId, raw: Value) -> Result<(), BridgeError> {
        let raw: RawEvent = serde_json::from_value(raw)
            .map_err(|e| BridgeError::Validation(format!("bad test event: {e}")))?;
        let event = RoomEvent::from_raw(room_id, &raw)?
            .ok_or_else(|| BridgeError::Validation("test event is not translated".into()))?;
        self.engine.handle_room_event(event).await
    }

    /// Parse a webhook body and hand it to the engine.
    pub async fn webhook(&self, body: Value) -> Result<(), BridgeError> {
        let event: WebhookEvent = serde_json::from_value(body)
            .map_err(|e| BridgeError::Validation(format!("bad test webhook: {e}")))?;
        self.engine.handle_webhook(event).await
    }

    /// Wait for detached background work to finish.
    pub async fn settle(&self) {
        self.engine.drain(Duration::from_secs(5)).await;
    }
}
