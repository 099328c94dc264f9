// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Desk webhooks into protocol events.

use std::collections::HashSet;
use std::sync::Arc;

use deskbridge_core::desk::{Attachment, MessageEvent, StatusChangedEvent};
use deskbridge_core::types::{
    ConversationStatus, EventId, MessageId, OwnedEventId, RoomId, TransactionId,
};
use deskbridge_core::BridgeError;
use deskbridge_storage::MessagePart;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::attachments::{self, DESK_MESSAGE_ID_KEY};
use crate::context::BridgeContext;
use crate::lifecycle;
use crate::markup;

pub const DESK_FAILURE_NOTE: &str =
    "**Error occurred while handling Chatwoot message. The message may not have been sent to Matrix!**";

/// Relay a created or updated desk message into its room.
///
/// Failures after the room is known are also reported to the conversation
/// as a private note.
pub async fn handle_message_event(
    ctx: &Arc<BridgeContext>,
    event: &MessageEvent,
) -> Result<(), BridgeError> {
    if event.stays_on_desk() {
        debug!(message_id = %event.id, "skipping private or activity message");
        return Ok(());
    }

    let conversation_id = event.conversation.id;
    let result = relay(ctx, event).await;
    if let Err(e) = &result {
        let note = format!("{DESK_FAILURE_NOTE}\n\nError: {e}");
        let note = note.as_str();
        let desk = ctx.desk.as_ref();
        if let Err(note_err) = ctx
            .retry
            .run("post failure note", move |_| {
                desk.send_private_message(conversation_id, note)
            })
            .await
        {
            error!(%conversation_id, error = %note_err, "failed to post failure note");
        }
    }
    result
}

async fn relay(ctx: &Arc<BridgeContext>, event: &MessageEvent) -> Result<(), BridgeError> {
    let room_id = match lifecycle::resolve_room(ctx, &event.conversation).await {
        Ok(room_id) => room_id,
        Err(e) if e.is_not_found() => {
            debug!(conversation_id = %event.conversation.id, "no room for conversation");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let _guard = ctx.locks.acquire(&room_id).await;

    if event.content_attributes.deleted {
        info!(message_id = %event.id, %room_id, "desk message deleted");
        let linked = ctx.store.event_ids_for_message(event.id).await?;
        return redact_linked(ctx, &room_id, &linked).await;
    }

    let parts = ctx.store.linked_parts(event.id).await?;
    if parts.iter().any(Option::is_none) {
        info!(message_id = %event.id, "desk message already has protocol events");
        return Ok(());
    }
    let sent: HashSet<MessagePart> = parts.into_iter().flatten().collect();

    if let Some(content) = event.content.as_deref().filter(|c| !c.is_empty()) {
        if sent.contains(&MessagePart::Text) {
            debug!(message_id = %event.id, "text already relayed");
        } else {
            let first_name = event.effective_sender().and_then(|s| s.first_name());
            let text = markup::signed(content, first_name, ctx.settings.sign_agent_messages);
            let body = text_content(&text, event.id, ctx.settings.render_markdown);
            let event_id = send_message(ctx, &room_id, body).await?;
            ctx.store
                .record_message_part(&event_id, event.id, MessagePart::Text)
                .await?;
        }
    }

    let mut failures = Vec::new();
    for attachment in event.effective_attachments() {
        let part = MessagePart::Attachment(attachment.id);
        if sent.contains(&part) {
            debug!(message_id = %event.id, attachment_id = %attachment.id, "attachment already relayed");
            continue;
        }
        if let Err(e) = relay_attachment(ctx, &room_id, event.id, attachment).await {
            warn!(message_id = %event.id, attachment_id = %attachment.id, error = %e, "failed to relay attachment");
            failures.push(e);
        }
    }
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(BridgeError::Aggregate(failures)),
    }
}

async fn relay_attachment(
    ctx: &BridgeContext,
    room_id: &RoomId,
    message_id: MessageId,
    attachment: &Attachment,
) -> Result<(), BridgeError> {
    let content = attachments::desk_attachment_content(ctx, room_id, message_id, attachment).await?;
    let event_id = send_message(ctx, room_id, content).await?;
    ctx.store
        .record_message_part(&event_id, message_id, MessagePart::Attachment(attachment.id))
        .await
}

fn text_content(text: &str, message_id: MessageId, render_markdown: bool) -> Value {
    let mut content = Map::new();
    content.insert("msgtype".into(), json!("m.text"));
    content.insert("body".into(), json!(text));
    if render_markdown && let Some(html) = markup::render_markdown(text) {
        content.insert("format".into(), json!("org.matrix.custom.html"));
        content.insert("formatted_body".into(), json!(html));
    }
    content.insert(DESK_MESSAGE_ID_KEY.into(), json!(message_id));
    Value::Object(content)
}

async fn send_message(
    ctx: &BridgeContext,
    room_id: &RoomId,
    content: Value,
) -> Result<OwnedEventId, BridgeError> {
    let protocol = ctx.protocol.as_ref();
    let txn_id = TransactionId::new();
    let txn_id: &TransactionId = &txn_id;
    ctx.retry
        .run("send protocol message", move |_| {
            protocol.send_event(room_id, "m.room.message", content.clone(), txn_id)
        })
        .await
}

/// Redact every linked event that is not already redacted.
async fn redact_linked(
    ctx: &BridgeContext,
    room_id: &RoomId,
    event_ids: &[OwnedEventId],
) -> Result<(), BridgeError> {
    let protocol = ctx.protocol.as_ref();
    let mut failures = Vec::new();
    for event_id in event_ids {
        let event_id: &EventId = event_id;
        match protocol.get_event(room_id, event_id).await {
            Ok(existing) if existing.is_redacted() => {
                debug!(%event_id, "event already redacted");
                continue;
            }
            Ok(_) => {}
            Err(e) => debug!(%event_id, error = %e, "could not check redaction state"),
        }
        let txn_id = TransactionId::new();
        let txn_id: &TransactionId = &txn_id;
        let result = ctx
            .retry
            .run("redact protocol event", move |_| {
                protocol.redact_event(room_id, event_id, None, txn_id)
            })
            .await;
        if let Err(e) = result {
            warn!(%event_id, error = %e, "failed to redact event");
            failures.push(e);
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::Aggregate(failures))
    }
}

/// Mark the room read when its conversation is reopened.
pub async fn handle_status_changed(
    ctx: &BridgeContext,
    event: &StatusChangedEvent,
) -> Result<(), BridgeError> {
    if event.status != ConversationStatus::Open {
        return Ok(());
    }
    let Some(link) = ctx.store.link_conversation(event.id).await? else {
        debug!(conversation_id = %event.id, "status change for unlinked conversation");
        return Ok(());
    };
    let Some(event_id) = link.most_recent_event_id else {
        debug!(room_id = %link.room_id, "no event to mark read");
        return Ok(());
    };

    let protocol = ctx.protocol.as_ref();
    let room_id: &RoomId = &link.room_id;
    let receipt_at: &EventId = &event_id;
    if let Err(e) = ctx
        .retry
        .run("send read receipt", move |_| {
            protocol.send_read_receipt(room_id, receipt_at)
        })
        .await
    {
        warn!(%room_id, %event_id, error = %e, "failed to send read receipt");
    }
    Ok(())
}
