// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message link and processed-redaction queries.

use deskbridge_core::types::{EventId, MessageId, OwnedEventId};
use deskbridge_core::BridgeError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{MessagePart, parse_event_id, parse_message_part};

/// Append one event <-> desk message pairing. Re-recording the same pair is a no-op.
pub async fn record_message_link(
    db: &Database,
    event_id: &EventId,
    message_id: MessageId,
) -> Result<(), BridgeError> {
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_links (event_id, message_id) VALUES (?1, ?2)",
                params![event_id, message_id.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Link an event to the part of a desk message it was sent for.
pub async fn record_message_part(
    db: &Database,
    event_id: &EventId,
    message_id: MessageId,
    part: MessagePart,
) -> Result<(), BridgeError> {
    let event_id = event_id.to_string();
    let part = part.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_links (event_id, message_id, part)
                 VALUES (?1, ?2, ?3)",
                params![event_id, message_id.0, part],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Parts of a desk message that already have an event. `None` marks a link
/// recorded without a part.
pub async fn linked_parts(
    db: &Database,
    message_id: MessageId,
) -> Result<Vec<Option<MessagePart>>, BridgeError> {
    let raw = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT part FROM message_links WHERE message_id = ?1 ORDER BY rowid",
            )?;
            let rows =
                stmt.query_map(params![message_id.0], |row| row.get::<_, Option<String>>(0))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    raw.iter()
        .map(|part| part.as_deref().map(parse_message_part).transpose())
        .collect()
}

/// Desk messages produced from (or producing) an event.
pub async fn message_ids_for_event(
    db: &Database,
    event_id: &EventId,
) -> Result<Vec<MessageId>, BridgeError> {
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id FROM message_links WHERE event_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![event_id], |row| row.get::<_, i64>(0))?;
            rows.map(|r| r.map(MessageId)).collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Events produced from (or producing) a desk message.
pub async fn event_ids_for_message(
    db: &Database,
    message_id: MessageId,
) -> Result<Vec<OwnedEventId>, BridgeError> {
    let raw = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id FROM message_links WHERE message_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![message_id.0], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    raw.iter().map(|id| parse_event_id(id)).collect()
}

/// Whether a redaction of `redacts` has already been applied.
pub async fn redaction_processed(db: &Database, redacts: &EventId) -> Result<bool, BridgeError> {
    let redacts = redacts.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM processed_redactions WHERE redacts = ?1)",
                params![redacts],
                |row| row.get::<_, bool>(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a redaction as applied.
pub async fn record_redaction(
    db: &Database,
    redaction_event_id: &EventId,
    redacts: &EventId,
) -> Result<(), BridgeError> {
    let redaction_event_id = redaction_event_id.to_string();
    let redacts = redacts.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO processed_redactions (redaction_event_id, redacts)
                 VALUES (?1, ?2)",
                params![redaction_event_id, redacts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
