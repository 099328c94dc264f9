// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/sync` long-poll loop.
//!
//! Keeps the identity store's room metadata (membership, encryption, batch
//! token) current, joins rooms the bot is invited to, and forwards every
//! authorized timeline event to the engine as a [`RoomEvent`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use deskbridge_core::error::BridgeError;
use deskbridge_core::event::{RawEvent, RoomEvent};
use deskbridge_core::traits::ProtocolClient;
use deskbridge_core::types::{EventId, OwnedRoomId, RoomId, UserId};
use deskbridge_resilience::{FibonacciBackoff, RetryPolicy};
use deskbridge_storage::IdentityStore;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{MatrixClient, raw_event};

/// The parts of one sync response the bridge consumes, with every event
/// already decrypted by the SDK where a room key was available.
#[derive(Debug, Default, Deserialize)]
pub struct SyncBatch {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub join: BTreeMap<OwnedRoomId, JoinedRoom>,
    #[serde(default)]
    pub invite: BTreeMap<OwnedRoomId, InvitedRoom>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

fn core_room_id(room_id: &matrix_sdk::ruma::RoomId) -> Option<OwnedRoomId> {
    RoomId::parse(room_id.as_str()).ok()
}

fn parse_all<'a, T: 'a>(
    room_id: &RoomId,
    raws: impl IntoIterator<Item = &'a matrix_sdk::ruma::serde::Raw<T>>,
) -> Vec<RawEvent> {
    raws.into_iter()
        .filter_map(|raw| {
            raw_event(raw)
                .inspect_err(|e| warn!(%room_id, error = %e, "skipping unparseable event"))
                .ok()
        })
        .collect()
}

impl SyncBatch {
    pub fn from_sdk(response: &matrix_sdk::sync::SyncResponse) -> Self {
        let mut rooms = Rooms::default();
        for (room_id, update) in &response.rooms.joined {
            let Some(room_id) = core_room_id(room_id) else {
                continue;
            };
            let events = parse_all(&room_id, update.timeline.events.iter().map(|e| e.raw()));
            rooms.join.insert(
                room_id,
                JoinedRoom {
                    timeline: EventList { events },
                },
            );
        }
        for (room_id, invite) in &response.rooms.invited {
            let Some(room_id) = core_room_id(room_id) else {
                continue;
            };
            let events = parse_all(&room_id, &invite.invite_state.events);
            rooms.invite.insert(
                room_id,
                InvitedRoom {
                    invite_state: EventList { events },
                },
            );
        }
        Self {
            next_batch: response.next_batch.clone(),
            rooms,
        }
    }
}

/// Which senders may have their events bridged.
#[derive(Debug, Clone)]
pub struct SenderFilter {
    bot_server: String,
    allowed: Vec<String>,
    allow_all: bool,
}

impl SenderFilter {
    /// The bot's homeserver is always allowed.
    pub fn new(bot_user_id: &UserId, allowed: Vec<String>, allow_all: bool) -> Self {
        Self {
            bot_server: bot_user_id.server_name().to_string(),
            allowed,
            allow_all,
        }
    }

    pub fn allows(&self, sender: &UserId) -> bool {
        if self.allow_all {
            return true;
        }
        let server = sender.server_name().as_str();
        server == self.bot_server || self.allowed.iter().any(|s| s == server)
    }
}

/// Applies sync batches: room metadata, invites, authorized events.
pub struct SyncProcessor {
    protocol: Arc<dyn ProtocolClient>,
    store: IdentityStore,
    filter: SenderFilter,
    retry: RetryPolicy,
    auto_join: bool,
}

/// Drives `/sync` and hands each batch to a [`SyncProcessor`].
pub struct SyncLoop {
    client: Arc<MatrixClient>,
    processor: SyncProcessor,
    timeout: Duration,
}

impl SyncLoop {
    pub fn new(client: Arc<MatrixClient>, processor: SyncProcessor, timeout: Duration) -> Self {
        Self {
            client,
            processor,
            timeout,
        }
    }

    /// Poll until `cancel` fires. Transport failures back off and retry forever.
    pub async fn run(
        self,
        events: mpsc::Sender<RoomEvent>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let bot = self.client.bot_user_id().to_owned();
        let store = &self.processor.store;
        let mut since = store.next_batch(&bot).await?;
        if since.is_none() {
            info!("no stored sync token, initial sync records state only");
        }
        let mut backoff =
            FibonacciBackoff::new(Duration::from_secs(1)).with_max(Duration::from_secs(60));

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("sync loop stopping");
                    return Ok(());
                }
                batch = self.client.sync_once(since.as_deref(), self.timeout) => batch,
            };

            let batch = match batch {
                Ok(batch) => {
                    backoff.reset();
                    batch
                }
                Err(e) => {
                    let delay = backoff.next().unwrap_or(Duration::from_secs(60));
                    error!(error = %e, retry_in_ms = delay.as_millis() as u64, "sync failed");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            let initial = since.is_none();
            self.processor.process(&batch, initial, &events).await;
            if let Err(e) = store.set_next_batch(&bot, &batch.next_batch).await {
                warn!(error = %e, "failed to persist sync token");
            }
            since = Some(batch.next_batch);
        }
    }
}

impl SyncProcessor {
    pub fn new(
        protocol: Arc<dyn ProtocolClient>,
        store: IdentityStore,
        filter: SenderFilter,
        retry: RetryPolicy,
        auto_join: bool,
    ) -> Self {
        Self {
            protocol,
            store,
            filter,
            retry,
            auto_join,
        }
    }

    /// Apply one sync response. Store failures are logged per event so
    /// one bad row never stalls the feed.
    pub async fn process(
        &self,
        batch: &SyncBatch,
        initial: bool,
        events: &mpsc::Sender<RoomEvent>,
    ) {
        for (room_id, invited) in &batch.rooms.invite {
            self.handle_invite(room_id, invited).await;
        }

        for (room_id, joined) in &batch.rooms.join {
            for raw in &joined.timeline.events {
                if raw.state_key.is_some() {
                    self.record_state(room_id, raw).await;
                }
            }
            if initial {
                continue;
            }
            for raw in &joined.timeline.events {
                if raw.state_key.is_some() {
                    continue;
                }
                if let Some(event) = self.authorize(room_id, raw).await
                    && events.send(event).await.is_err()
                {
                    warn!("event receiver closed, dropping event");
                    return;
                }
            }
        }
    }

    async fn record_state(&self, room_id: &RoomId, raw: &RawEvent) {
        let result = match raw.event_type.as_str() {
            "m.room.member" => {
                let membership = raw
                    .content
                    .get("membership")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("leave");
                match raw.state_key.as_deref().map(UserId::parse) {
                    Some(Ok(user)) => {
                        debug!(room_id = %room_id, user_id = %user, membership, "membership changed");
                        self.store.set_membership(room_id, &user, membership).await
                    }
                    _ => Ok(()),
                }
            }
            "m.room.encryption" => self.store.set_encrypted(room_id, true).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(room_id = %room_id, error = %e, "failed to record room state");
        }
    }

    async fn handle_invite(&self, room_id: &RoomId, invited: &InvitedRoom) {
        let bot = self.protocol.bot_user_id();
        let inviter = invited
            .invite_state
            .events
            .iter()
            .find(|e| e.event_type == "m.room.member" && e.state_key.as_deref() == Some(bot.as_str()))
            .and_then(|e| e.sender.as_deref())
            .and_then(|s| UserId::parse(s).ok());

        if !self.auto_join {
            debug!(room_id = %room_id, "auto-join disabled, ignoring invite");
            return;
        }
        match inviter {
            Some(inviter) if self.filter.allows(&inviter) => {}
            other => {
                info!(room_id = %room_id, inviter = ?other, "ignoring invite from unauthorized user");
                return;
            }
        }

        info!(room_id = %room_id, "joining room");
        let protocol = self.protocol.as_ref();
        match self
            .retry
            .run("join room", move |_| protocol.join_room(room_id))
            .await
        {
            Ok(()) => {
                info!(room_id = %room_id, "joined room");
                if let Err(e) = self.store.set_membership(room_id, bot, "join").await {
                    warn!(room_id = %room_id, error = %e, "failed to record own membership");
                }
            }
            Err(e) => error!(room_id = %room_id, error = %e, "could not join room"),
        }
    }

    /// Decrypt and parse a timeline event, returning it only when its sender is allowed.
    async fn authorize(&self, room_id: &RoomId, raw: &RawEvent) -> Option<RoomEvent> {
        if let Some(event_id) = raw.event_id.as_deref().and_then(|id| EventId::parse(id).ok())
            && matches!(
                raw.event_type.as_str(),
                "m.room.message" | "m.reaction" | "m.room.redaction" | "m.room.encrypted"
            )
            && let Err(e) = self.store.set_most_recent_event(room_id, &event_id).await
        {
            warn!(room_id = %room_id, error = %e, "failed to update most recent event");
        }

        let sender = raw.sender.as_deref().and_then(|s| UserId::parse(s).ok())?;
        if !self.filter.allows(&sender) {
            debug!(room_id = %room_id, sender = %sender, "ignoring event from unauthorized sender");
            return None;
        }

        let plain;
        let raw = if raw.is_encrypted() {
            match self.protocol.decrypt(room_id, raw).await {
                Ok(decrypted) => {
                    plain = decrypted;
                    &plain
                }
                Err(e) => {
                    warn!(room_id = %room_id, event_id = ?raw.event_id, error = %e, "failed to decrypt event");
                    return RoomEvent::undecryptable(room_id, raw, e.to_string())
                        .inspect_err(|e| warn!(error = %e, "dropping malformed encrypted event"))
                        .ok();
                }
            }
        } else {
            raw
        };

        match RoomEvent::from_raw(room_id, raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(room_id = %room_id, event_id = ?raw.event_id, error = %e, "dropping malformed event");
                None
            }
        }
    }
}
