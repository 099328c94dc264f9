// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation link queries.

use deskbridge_core::types::{ConversationId, EventId, RoomId};
use deskbridge_core::BridgeError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{ConversationLink, parse_event_id, parse_room_id};

/// Conversation linked to a room.
pub async fn link_room(
    db: &Database,
    room_id: &RoomId,
) -> Result<Option<ConversationId>, BridgeError> {
    let room_id = room_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT conversation_id FROM conversation_links WHERE room_id = ?1",
                params![room_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
        })
        .await
        .map(|id| id.map(ConversationId))
        .map_err(map_tr_err)
}

/// Room linked to a conversation, with the room's most recent event.
pub async fn link_conversation(
    db: &Database,
    conversation_id: ConversationId,
) -> Result<Option<ConversationLink>, BridgeError> {
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT l.room_id, r.most_recent_event_id
                 FROM conversation_links l
                 LEFT JOIN rooms r ON r.room_id = l.room_id
                 WHERE l.conversation_id = ?1",
                params![conversation_id.0],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    row.map(|(room_id, most_recent)| {
        Ok(ConversationLink {
            room_id: parse_room_id(&room_id)?,
            conversation_id,
            most_recent_event_id: most_recent.as_deref().map(parse_event_id).transpose()?,
        })
    })
    .transpose()
}

/// Insert or repoint the link for `room_id`.
pub async fn upsert_link(
    db: &Database,
    room_id: &RoomId,
    conversation_id: ConversationId,
) -> Result<(), BridgeError> {
    let room_id = room_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_links (room_id, conversation_id) VALUES (?1, ?2)
                 ON CONFLICT(room_id) DO UPDATE SET
                     conversation_id = excluded.conversation_id,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![room_id, conversation_id.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move the room's read cursor.
pub async fn set_most_recent_event(
    db: &Database,
    room_id: &RoomId,
    event_id: &EventId,
) -> Result<(), BridgeError> {
    let room_id = room_id.to_string();
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO rooms (room_id, most_recent_event_id) VALUES (?1, ?2)
                 ON CONFLICT(room_id) DO UPDATE SET most_recent_event_id = excluded.most_recent_event_id",
                params![room_id, event_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Every stored link, oldest first.
pub async fn all_links(db: &Database) -> Result<Vec<ConversationLink>, BridgeError> {
    let rows = db
        .connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.room_id, l.conversation_id, r.most_recent_event_id
                 FROM conversation_links l
                 LEFT JOIN rooms r ON r.room_id = l.room_id
                 ORDER BY l.created_at, l.room_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter()
        .map(|(room_id, conversation_id, most_recent)| {
            Ok(ConversationLink {
                room_id: parse_room_id(&room_id)?,
                conversation_id: ConversationId(conversation_id),
                most_recent_event_id: most_recent.as_deref().map(parse_event_id).transpose()?,
            })
        })
        .collect()
}
