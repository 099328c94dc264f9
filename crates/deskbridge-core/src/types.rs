// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier newtypes and small shared enums.
//!
//! Protocol-side identifiers reuse the `ruma` types; desk-side identifiers are
//! integer newtypes so a conversation ID can never be passed where a message
//! ID is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use ruma::{
    EventId, MxcUri, OwnedEventId, OwnedMxcUri, OwnedRoomId, OwnedTransactionId, OwnedUserId,
    RoomId, TransactionId, UserId,
};

macro_rules! desk_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

desk_id!(
    /// Desk conversation identifier.
    ConversationId
);
desk_id!(
    /// Desk message identifier.
    MessageId
);
desk_id!(
    /// Desk contact identifier.
    ContactId
);
desk_id!(
    /// Desk attachment identifier.
    AttachmentId
);

/// Desk conversation status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Resolved,
    Pending,
    Snoozed,
}

/// Direction of a desk message relative to the support team.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageDirection {
    /// Written by the customer (the non-bot room member).
    Incoming,
    /// Written by the support side (the bot or an agent).
    Outgoing,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn desk_ids_serialize_as_bare_integers() {
        let id = ConversationId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let parsed: MessageId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, MessageId(7));
        assert_eq!(ContactId(3).to_string(), "3");
    }

    #[test]
    fn status_round_trips_through_strum_and_serde() {
        assert_eq!(ConversationStatus::Open.to_string(), "open");
        assert_eq!(
            ConversationStatus::from_str("resolved").unwrap(),
            ConversationStatus::Resolved
        );
        let json = serde_json::to_string(&ConversationStatus::Snoozed).unwrap();
        assert_eq!(json, "\"snoozed\"");
    }

    #[test]
    fn direction_names_match_desk_wire_values() {
        assert_eq!(MessageDirection::Incoming.to_string(), "incoming");
        assert_eq!(MessageDirection::Outgoing.to_string(), "outgoing");
    }
}
