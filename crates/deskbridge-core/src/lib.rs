// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for deskbridge.
//!
//! Provides the error type, identifier newtypes, the protocol event and desk
//! webhook models, and the collaborator traits every other crate in the
//! workspace builds on.

pub mod desk;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BridgeError;
pub use event::{RawEvent, RoomEvent, RoomEventKind};
pub use types::{
    AttachmentId, ContactId, ConversationId, ConversationStatus, MessageDirection, MessageId,
};

pub use traits::{AttachmentUpload, DeskClient, ProtocolClient, RoomProvisioner, WebhookHandler};
