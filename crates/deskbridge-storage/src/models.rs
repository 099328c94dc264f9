// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rows read back from the identity store.

use std::fmt;

use deskbridge_core::types::{AttachmentId, ConversationId, OwnedEventId, OwnedRoomId};
use deskbridge_core::BridgeError;

/// A room paired with its desk conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationLink {
    pub room_id: OwnedRoomId,
    pub conversation_id: ConversationId,
    /// Last protocol event observed in the room, for read-receipt placement.
    pub most_recent_event_id: Option<OwnedEventId>,
}

/// The piece of a desk message a protocol event was sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagePart {
    Text,
    Attachment(AttachmentId),
}

impl fmt::Display for MessagePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Attachment(id) => write!(f, "attachment:{}", id.0),
        }
    }
}

pub(crate) fn parse_message_part(value: &str) -> Result<MessagePart, BridgeError> {
    if value == "text" {
        return Ok(MessagePart::Text);
    }
    value
        .strip_prefix("attachment:")
        .and_then(|id| id.parse::<i64>().ok())
        .map(|id| MessagePart::Attachment(AttachmentId(id)))
        .ok_or_else(|| corrupt("message part", value, "unknown format"))
}

fn corrupt(what: &str, value: &str, err: impl std::fmt::Display) -> BridgeError {
    BridgeError::Storage {
        source: format!("stored {what} {value:?} is invalid: {err}").into(),
    }
}

pub(crate) fn parse_room_id(value: &str) -> Result<OwnedRoomId, BridgeError> {
    deskbridge_core::types::RoomId::parse(value).map_err(|e| corrupt("room ID", value, e))
}

pub(crate) fn parse_event_id(value: &str) -> Result<OwnedEventId, BridgeError> {
    deskbridge_core::types::EventId::parse(value).map_err(|e| corrupt("event ID", value, e))
}

pub(crate) fn parse_user_id(value: &str) -> Result<deskbridge_core::types::OwnedUserId, BridgeError> {
    deskbridge_core::types::UserId::parse(value).map_err(|e| corrupt("user ID", value, e))
}
