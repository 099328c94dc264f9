// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock room provisioner returning a fixed room.

use async_trait::async_trait;
use deskbridge_core::BridgeError;
use deskbridge_core::desk::Contact;
use deskbridge_core::traits::RoomProvisioner;
use deskbridge_core::types::OwnedRoomId;
use tokio::sync::Mutex;

pub struct MockProvisioner {
    room_id: OwnedRoomId,
    requests: Mutex<Vec<Contact>>,
}

impl MockProvisioner {
    pub fn new(room_id: OwnedRoomId) -> Self {
        Self {
            room_id,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Contacts rooms were requested for, in order.
    pub async fn requests(&self) -> Vec<Contact> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl RoomProvisioner for MockProvisioner {
    async fn provision_room(&self, contact: &Contact) -> Result<OwnedRoomId, BridgeError> {
        self.requests.lock().await.push(contact.clone());
        Ok(self.room_id.clone())
    }
}
