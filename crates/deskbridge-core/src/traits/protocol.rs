// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-protocol client trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BridgeError;
use crate::event::{MediaSource, RawEvent};
use crate::types::{EventId, OwnedEventId, OwnedUserId, RoomId, TransactionId, UserId};

/// Operations the engine needs from the chat-protocol side.
///
/// Encryption is transparent: callers submit plaintext content, receive
/// plaintext from [`decrypt`](ProtocolClient::decrypt) and
/// [`download_media`](ProtocolClient::download_media), and ask
/// [`upload_media`](ProtocolClient::upload_media) for an encrypted upload
/// when the target room is encrypted.
///
/// Sends take a caller-chosen transaction ID. Retrying one logical send must
/// reuse the same ID so the server deduplicates it.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// The bridge bot's own identity.
    fn bot_user_id(&self) -> &UserId;

    /// Send a message-like event and return its ID.
    ///
    /// Content carrying an attachment key is refused unless the room is
    /// encrypted.
    async fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        content: Value,
        txn_id: &TransactionId,
    ) -> Result<OwnedEventId, BridgeError>;

    /// Fetch a single event by ID.
    async fn get_event(&self, room_id: &RoomId, event_id: &EventId) -> Result<RawEvent, BridgeError>;

    /// Redact an event, returning the redaction's event ID.
    async fn redact_event(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        reason: Option<&str>,
        txn_id: &TransactionId,
    ) -> Result<OwnedEventId, BridgeError>;

    /// Download media and return its plaintext, decrypting encrypted sources.
    async fn download_media(&self, source: &MediaSource) -> Result<Vec<u8>, BridgeError>;

    /// Upload media. With `encrypt` set the bytes are encrypted first and the
    /// returned source carries the decryption envelope.
    async fn upload_media(
        &self,
        data: Vec<u8>,
        content_type: &str,
        filename: Option<&str>,
        encrypt: bool,
    ) -> Result<MediaSource, BridgeError>;

    /// Currently joined members of a room.
    async fn joined_members(&self, room_id: &RoomId) -> Result<Vec<OwnedUserId>, BridgeError>;

    async fn join_room(&self, room_id: &RoomId) -> Result<(), BridgeError>;

    async fn leave_room(&self, room_id: &RoomId) -> Result<(), BridgeError>;

    async fn send_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<OwnedEventId, BridgeError>;

    /// Current state content, or `None` when the state event does not exist.
    async fn get_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, BridgeError>;

    async fn send_read_receipt(&self, room_id: &RoomId, event_id: &EventId) -> Result<(), BridgeError>;

    /// Decrypt an `m.room.encrypted` event into its plaintext form.
    async fn decrypt(&self, room_id: &RoomId, event: &RawEvent) -> Result<RawEvent, BridgeError>;
}
