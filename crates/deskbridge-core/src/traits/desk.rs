// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support-desk client trait.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::desk::{Conversation, DeskMessage};
use crate::error::BridgeError;
use crate::types::{
    ContactId, ConversationId, ConversationStatus, MessageDirection, MessageId, RoomId, UserId,
};

/// A file to attach to a new desk message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Contact, conversation, and message CRUD on the desk side.
///
/// Implementations surface non-2xx responses as [`BridgeError::Desk`] with
/// the status code and response body.
#[async_trait]
pub trait DeskClient: Send + Sync {
    async fn create_contact(
        &self,
        identity: &UserId,
        display_name: &str,
    ) -> Result<ContactId, BridgeError>;

    /// Exact-identifier contact lookup.
    async fn find_contact_by_identity(
        &self,
        identity: &UserId,
    ) -> Result<Option<ContactId>, BridgeError>;

    async fn create_conversation(
        &self,
        source_id: &RoomId,
        contact_id: ContactId,
        additional_attributes: Map<String, Value>,
    ) -> Result<Conversation, BridgeError>;

    /// The contact's conversation previously created for `source_id`, if any.
    async fn find_conversation_for_source(
        &self,
        contact_id: ContactId,
        source_id: &RoomId,
    ) -> Result<Option<ConversationId>, BridgeError>;

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, BridgeError>;

    async fn set_conversation_custom_attributes(
        &self,
        id: ConversationId,
        attributes: Map<String, Value>,
    ) -> Result<(), BridgeError>;

    async fn get_conversation_labels(&self, id: ConversationId) -> Result<Vec<String>, BridgeError>;

    async fn set_conversation_labels(
        &self,
        id: ConversationId,
        labels: &[String],
    ) -> Result<(), BridgeError>;

    async fn toggle_conversation_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<(), BridgeError>;

    async fn send_text_message(
        &self,
        id: ConversationId,
        content: &str,
        direction: MessageDirection,
    ) -> Result<DeskMessage, BridgeError>;

    /// Internal note visible only to agents.
    async fn send_private_message(
        &self,
        id: ConversationId,
        content: &str,
    ) -> Result<DeskMessage, BridgeError>;

    async fn send_attachment_message(
        &self,
        id: ConversationId,
        upload: AttachmentUpload,
        direction: MessageDirection,
    ) -> Result<DeskMessage, BridgeError>;

    async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), BridgeError>;

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, BridgeError>;
}
