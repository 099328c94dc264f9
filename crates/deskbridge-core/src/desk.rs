// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Desk-side records and webhook payloads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::{AttachmentId, ContactId, ConversationId, ConversationStatus, MessageId};

/// Conversation additional attribute naming the bridged room.
pub const ROOM_ID_ATTRIBUTE: &str = "matrix_room_id";

/// Deserialize `null` as the type's default.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A desk contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
}

/// A file attached to a desk message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    pub data_url: String,
    #[serde(default)]
    pub thumb_url: Option<String>,
}

impl Attachment {
    /// Thumbnail URL, treating an empty string as absent.
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumb_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Author of a desk message (an agent, a contact, or the API bot).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub available_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl Sender {
    /// First word of the sender's display name, for signing relayed messages.
    pub fn first_name(&self) -> Option<&str> {
        self.available_name
            .as_deref()
            .or(self.name.as_deref())
            .and_then(|n| n.split_whitespace().next())
    }
}

/// A message as returned by the desk REST API or nested in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskMessage {
    pub id: MessageId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub sender: Option<Sender>,
}

/// Conversation metadata block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    #[serde(default)]
    pub sender: Option<Contact>,
}

/// A desk conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub inbox_id: Option<i64>,
    #[serde(default)]
    pub status: Option<ConversationStatus>,
    #[serde(default, deserialize_with = "null_default")]
    pub messages: Vec<DeskMessage>,
    #[serde(default, deserialize_with = "null_default")]
    pub meta: ConversationMeta,
    #[serde(default, deserialize_with = "null_default")]
    pub custom_attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "null_default")]
    pub additional_attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "null_default")]
    pub labels: Vec<String>,
}

/// Flags attached to a message's content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAttributes {
    #[serde(default)]
    pub deleted: bool,
}

/// `message_type` as the webhook reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeskMessageType {
    Incoming,
    Outgoing,
    Activity,
    Template,
    #[serde(other)]
    Unknown,
}

/// Payload of `message_created` and `message_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: MessageId,
    #[serde(default)]
    pub content: Option<String>,
    pub message_type: DeskMessageType,
    #[serde(default, deserialize_with = "null_default")]
    pub content_attributes: ContentAttributes,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub sender: Option<Sender>,
    pub conversation: Conversation,
    #[serde(default, deserialize_with = "null_default")]
    pub attachments: Vec<Attachment>,
}

impl MessageEvent {
    /// Attachments of this message, falling back to the copy nested in the conversation.
    pub fn effective_attachments(&self) -> &[Attachment] {
        if !self.attachments.is_empty() {
            return &self.attachments;
        }
        self.conversation
            .messages
            .iter()
            .find(|m| m.id == self.id)
            .map(|m| m.attachments.as_slice())
            .unwrap_or_default()
    }

    /// Author of this message, falling back to the nested copy.
    pub fn effective_sender(&self) -> Option<&Sender> {
        self.sender.as_ref().or_else(|| {
            self.conversation
                .messages
                .iter()
                .find(|m| m.id == self.id)
                .and_then(|m| m.sender.as_ref())
        })
    }

    /// Whether this message is an internal note or a system activity line.
    pub fn stays_on_desk(&self) -> bool {
        self.private || self.message_type == DeskMessageType::Activity
    }
}

/// Payload of `conversation_status_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub id: ConversationId,
    pub status: ConversationStatus,
}

/// Webhook body, discriminated by its `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookEvent {
    MessageCreated(MessageEvent),
    MessageUpdated(MessageEvent),
    ConversationStatusChanged(StatusChangedEvent),
    #[serde(other)]
    Unrecognized,
}
