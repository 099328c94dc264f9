// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-room mutual exclusion.
//!
//! Both translators take the room's lock before their dedup read and hold it
//! until the last link is written. Locks are created on first use and live
//! for the rest of the process.

use std::sync::Arc;

use dashmap::DashMap;
use deskbridge_core::types::{OwnedRoomId, RoomId};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Held for the duration of one room's critical section.
pub type RoomGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<OwnedRoomId, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `room_id`.
    pub async fn acquire(&self, room_id: &RoomId) -> RoomGuard {
        let lock = self
            .locks
            .entry(room_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        trace!(%room_id, "acquired room lock");
        guard
    }

    /// Number of rooms that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
