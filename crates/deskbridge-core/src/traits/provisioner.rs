// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room auto-provisioning trait.

use async_trait::async_trait;

use crate::desk::Contact;
use crate::error::BridgeError;
use crate::types::OwnedRoomId;

/// Creates a protocol room for a desk conversation that has none yet.
#[async_trait]
pub trait RoomProvisioner: Send + Sync {
    async fn provision_room(&self, contact: &Contact) -> Result<OwnedRoomId, BridgeError>;
}
