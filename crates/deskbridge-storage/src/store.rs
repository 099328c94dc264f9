// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The identity store used by the engine and the sync loop.

use deskbridge_core::types::{
    ConversationId, EventId, MessageId, OwnedEventId, OwnedUserId, RoomId, UserId,
};
use deskbridge_core::BridgeError;

use crate::database::Database;
use crate::models::{ConversationLink, MessagePart};
use crate::queries::{links, messages, rooms};

/// Durable room/conversation and event/message mappings plus room metadata.
///
/// Cheap to clone; every clone shares the one background connection.
#[derive(Clone)]
pub struct IdentityStore {
    db: Database,
}

impl IdentityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the on-disk store, creating and migrating it as needed.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, BridgeError> {
        Ok(Self::new(Database::open(path, wal_mode).await?))
    }

    pub async fn open_in_memory() -> Result<Self, BridgeError> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn close(&self) -> Result<(), BridgeError> {
        self.db.close().await
    }

    pub async fn link_room(&self, room_id: &RoomId) -> Result<Option<ConversationId>, BridgeError> {
        links::link_room(&self.db, room_id).await
    }

    pub async fn link_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationLink>, BridgeError> {
        links::link_conversation(&self.db, conversation_id).await
    }

    pub async fn upsert_link(
        &self,
        room_id: &RoomId,
        conversation_id: ConversationId,
    ) -> Result<(), BridgeError> {
        links::upsert_link(&self.db, room_id, conversation_id).await
    }

    pub async fn set_most_recent_event(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
    ) -> Result<(), BridgeError> {
        links::set_most_recent_event(&self.db, room_id, event_id).await
    }

    pub async fn all_links(&self) -> Result<Vec<ConversationLink>, BridgeError> {
        links::all_links(&self.db).await
    }

    pub async fn record_message_link(
        &self,
        event_id: &EventId,
        message_id: MessageId,
    ) -> Result<(), BridgeError> {
        messages::record_message_link(&self.db, event_id, message_id).await
    }

    pub async fn record_message_part(
        &self,
        event_id: &EventId,
        message_id: MessageId,
        part: MessagePart,
    ) -> Result<(), BridgeError> {
        messages::record_message_part(&self.db, event_id, message_id, part).await
    }

    /// Parts of a desk message already sent, `None` for untracked links.
    pub async fn linked_parts(
        &self,
        message_id: MessageId,
    ) -> Result<Vec<Option<MessagePart>>, BridgeError> {
        messages::linked_parts(&self.db, message_id).await
    }

    pub async fn message_ids_for_event(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<MessageId>, BridgeError> {
        messages::message_ids_for_event(&self.db, event_id).await
    }

    pub async fn event_ids_for_message(
        &self,
        message_id: MessageId,
    ) -> Result<Vec<OwnedEventId>, BridgeError> {
        messages::event_ids_for_message(&self.db, message_id).await
    }

    pub async fn redaction_processed(&self, redacts: &EventId) -> Result<bool, BridgeError> {
        messages::redaction_processed(&self.db, redacts).await
    }

    pub async fn record_redaction(
        &self,
        redaction_event_id: &EventId,
        redacts: &EventId,
    ) -> Result<(), BridgeError> {
        messages::record_redaction(&self.db, redaction_event_id, redacts).await
    }

    pub async fn set_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        membership: &str,
    ) -> Result<(), BridgeError> {
        rooms::set_membership(&self.db, room_id, user_id, membership).await
    }

    pub async fn replace_joined_members(
        &self,
        room_id: &RoomId,
        members: &[OwnedUserId],
    ) -> Result<(), BridgeError> {
        rooms::replace_joined_members(&self.db, room_id, members).await
    }

    pub async fn joined_members(&self, room_id: &RoomId) -> Result<Vec<OwnedUserId>, BridgeError> {
        rooms::joined_members(&self.db, room_id).await
    }

    pub async fn set_encrypted(&self, room_id: &RoomId, encrypted: bool) -> Result<(), BridgeError> {
        rooms::set_encrypted(&self.db, room_id, encrypted).await
    }

    pub async fn is_encrypted(&self, room_id: &RoomId) -> Result<Option<bool>, BridgeError> {
        rooms::is_encrypted(&self.db, room_id).await
    }

    pub async fn next_batch(&self, user_id: &UserId) -> Result<Option<String>, BridgeError> {
        rooms::next_batch(&self.db, user_id).await
    }

    pub async fn set_next_batch(&self, user_id: &UserId, token: &str) -> Result<(), BridgeError> {
        rooms::set_next_batch(&self.db, user_id, token).await
    }
}
