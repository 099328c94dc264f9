// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room metadata observed from sync: membership, encryption, batch token.

use deskbridge_core::types::{OwnedUserId, RoomId, UserId};
use deskbridge_core::BridgeError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::parse_user_id;

/// Record one member's current membership (`join`, `leave`, `invite`, `ban`).
pub async fn set_membership(
    db: &Database,
    room_id: &RoomId,
    user_id: &UserId,
    membership: &str,
) -> Result<(), BridgeError> {
    let room_id = room_id.to_string();
    let user_id = user_id.to_string();
    let membership = membership.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO room_members (room_id, user_id, membership) VALUES (?1, ?2, ?3)
                 ON CONFLICT(room_id, user_id) DO UPDATE SET membership = excluded.membership",
                params![room_id, user_id, membership],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the cached joined set for a room with a live snapshot.
pub async fn replace_joined_members(
    db: &Database,
    room_id: &RoomId,
    members: &[OwnedUserId],
) -> Result<(), BridgeError> {
    let room_id = room_id.to_string();
    let members: Vec<String> = members.iter().map(ToString::to_string).collect();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM room_members WHERE room_id = ?1 AND membership = 'join'",
                params![room_id],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO room_members (room_id, user_id, membership) VALUES (?1, ?2, 'join')
                     ON CONFLICT(room_id, user_id) DO UPDATE SET membership = 'join'",
                )?;
                for member in &members {
                    stmt.execute(params![room_id, member])?;
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Cached joined members of a room.
pub async fn joined_members(
    db: &Database,
    room_id: &RoomId,
) -> Result<Vec<OwnedUserId>, BridgeError> {
    let room_id = room_id.to_string();
    let raw = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM room_members
                 WHERE room_id = ?1 AND membership = 'join' ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![room_id], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    raw.iter().map(|id| parse_user_id(id)).collect()
}

/// Flag a room as end-to-end encrypted (or not).
pub async fn set_encrypted(
    db: &Database,
    room_id: &RoomId,
    encrypted: bool,
) -> Result<(), BridgeError> {
    let room_id = room_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO rooms (room_id, encrypted) VALUES (?1, ?2)
                 ON CONFLICT(room_id) DO UPDATE SET encrypted = excluded.encrypted",
                params![room_id, encrypted],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Stored encryption flag; `None` when the room's state was never seen.
pub async fn is_encrypted(db: &Database, room_id: &RoomId) -> Result<Option<bool>, BridgeError> {
    let room_id = room_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT encrypted FROM rooms WHERE room_id = ?1",
                params![room_id],
                |row| row.get::<_, Option<bool>>(0),
            )
            .optional()
            .map(Option::flatten)
        })
        .await
        .map_err(map_tr_err)
}

/// Last `/sync` batch token for a user.
pub async fn next_batch(db: &Database, user_id: &UserId) -> Result<Option<String>, BridgeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT next_batch FROM sync_state WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_next_batch(
    db: &Database,
    user_id: &UserId,
    next_batch: &str,
) -> Result<(), BridgeError> {
    let user_id = user_id.to_string();
    let next_batch = next_batch.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sync_state (user_id, next_batch) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET next_batch = excluded.next_batch",
                params![user_id, next_batch],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
