// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the engine depends on.
//!
//! The engine never talks HTTP itself: the chat protocol, the desk REST API,
//! and the room provisioning endpoint sit behind these seams so each can be
//! swapped for a fake in tests.

pub mod desk;
pub mod protocol;
pub mod provisioner;
pub mod webhook;

pub use desk::{AttachmentUpload, DeskClient};
pub use protocol::ProtocolClient;
pub use provisioner::RoomProvisioner;
pub use webhook::WebhookHandler;
