// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol events into desk messages.
//!
//! Every handler runs inside the room lock. A handled event leaves one
//! message link per desk message it produced; a replay of the same event
//! finds those links and does nothing.

use std::sync::Arc;

use deskbridge_core::event::{MediaContent, MessageContent, RawEvent, RoomEvent, RoomEventKind};
use deskbridge_core::types::{
    ConversationId, ConversationStatus, EventId, MessageDirection, MessageId, RoomId, UserId,
};
use deskbridge_core::BridgeError;
use tracing::{debug, error, info, warn};

use crate::attachments;
use crate::background;
use crate::context::BridgeContext;
use crate::lifecycle;
use crate::markup;

pub const MESSAGE_FAILURE_NOTE: &str =
    "**Error occurred while receiving a Matrix message. You may have missed a message!**";
pub const REACTION_FAILURE_NOTE: &str =
    "**Error occurred while receiving a Matrix reaction. You may have missed a message reaction!**";

/// Translate one authorized protocol event.
pub async fn handle_room_event(ctx: &Arc<BridgeContext>, event: RoomEvent) -> Result<(), BridgeError> {
    let result = {
        let _guard = ctx.locks.acquire(&event.room_id).await;
        match &event.kind {
            RoomEventKind::Message(content) => handle_message(ctx, &event, content).await,
            RoomEventKind::Reaction { relates_to, key } => {
                handle_reaction(ctx, &event, relates_to, key).await
            }
            RoomEventKind::Redaction { redacts } => handle_redaction(ctx, &event, redacts).await,
            RoomEventKind::Undecryptable { reason } => {
                handle_undecryptable(ctx, &event, reason).await
            }
        }
    };

    if let Some(device) = event.device.clone() {
        background::spawn_device_update(ctx, event.room_id.clone(), device);
    }
    result
}

fn direction(ctx: &BridgeContext, sender: &UserId) -> MessageDirection {
    if sender == ctx.protocol.bot_user_id() {
        MessageDirection::Outgoing
    } else {
        MessageDirection::Incoming
    }
}

async fn already_linked(ctx: &BridgeContext, event_id: &EventId) -> Result<bool, BridgeError> {
    let existing = ctx.store.message_ids_for_event(event_id).await?;
    if existing.is_empty() {
        return Ok(false);
    }
    info!(%event_id, message_ids = ?existing, "event already has desk messages");
    Ok(true)
}

async fn record_links(
    ctx: &BridgeContext,
    event_id: &EventId,
    message_ids: &[MessageId],
) -> Result<(), BridgeError> {
    for message_id in message_ids {
        ctx.store.record_message_link(event_id, *message_id).await?;
    }
    Ok(())
}

/// Post `headline` and the error as a private note, optionally reopening.
async fn report_failure(
    ctx: &BridgeContext,
    conversation_id: ConversationId,
    headline: &str,
    err: &BridgeError,
    reopen: bool,
) {
    let note = format!("{headline}\n\nError: {err}");
    let note = note.as_str();
    let desk = ctx.desk.as_ref();
    if let Err(e) = ctx
        .retry
        .run("post failure note", move |_| desk.send_private_message(conversation_id, note))
        .await
    {
        error!(%conversation_id, error = %e, "failed to post failure note");
    }
    if reopen
        && let Err(e) = ctx
            .retry
            .run("reopen conversation", move |_| {
                desk.toggle_conversation_status(conversation_id, ConversationStatus::Open)
            })
            .await
    {
        error!(%conversation_id, error = %e, "failed to reopen conversation");
    }
}

async fn send_text(
    ctx: &BridgeContext,
    conversation_id: ConversationId,
    text: &str,
    direction: MessageDirection,
) -> Result<MessageId, BridgeError> {
    let desk = ctx.desk.as_ref();
    let message = ctx
        .retry
        .run("send desk message", move |_| {
            desk.send_text_message(conversation_id, text, direction)
        })
        .await?;
    Ok(message.id)
}

async fn handle_message(
    ctx: &Arc<BridgeContext>,
    event: &RoomEvent,
    content: &MessageContent,
) -> Result<(), BridgeError> {
    if already_linked(ctx, &event.event_id).await? {
        return Ok(());
    }
    let conversation_id = lifecycle::resolve_or_create(ctx, event).await?;
    let direction = direction(ctx, &event.sender);

    let delivered = match content {
        MessageContent::Text { body, is_edit } | MessageContent::Notice { body, is_edit } => {
            let text = if *is_edit {
                markup::normalize_edit(body)
            } else {
                body.clone()
            };
            send_text(ctx, conversation_id, &text, direction)
                .await
                .map(|id| vec![id])
        }
        MessageContent::Emote { body } => {
            send_text(ctx, conversation_id, &markup::emote(&event.sender, body), direction)
                .await
                .map(|id| vec![id])
        }
        MessageContent::Media(media) => {
            deliver_media(ctx, conversation_id, media, direction).await
        }
        MessageContent::Unsupported { msgtype } => Err(BridgeError::Validation(format!(
            "unsupported message type {msgtype:?} in {}",
            event.event_id
        ))),
    };

    let message_ids = match delivered {
        Ok(ids) => ids,
        Err(e) => {
            report_failure(ctx, conversation_id, MESSAGE_FAILURE_NOTE, &e, true).await;
            return Err(e);
        }
    };
    record_links(ctx, &event.event_id, &message_ids).await?;
    debug!(event_id = %event.event_id, %conversation_id, count = message_ids.len(), "delivered event to desk");

    if let MessageContent::Text { body, .. } | MessageContent::Notice { body, .. } = content {
        background::spawn_ticket_links(ctx, conversation_id, body);
    }
    Ok(())
}

async fn deliver_media(
    ctx: &BridgeContext,
    conversation_id: ConversationId,
    media: &MediaContent,
    direction: MessageDirection,
) -> Result<Vec<MessageId>, BridgeError> {
    let upload = attachments::fetch_protocol_media(ctx, media).await?;
    let desk = ctx.desk.as_ref();
    let sent = ctx
        .retry
        .run("send desk attachment", move |_| {
            desk.send_attachment_message(conversation_id, upload.clone(), direction)
        })
        .await?;
    let mut ids = vec![sent.id];

    let (_, caption) = media.filename_and_caption();
    if let Some(caption) = caption {
        match send_text(ctx, conversation_id, &format!("Caption: {caption}"), direction).await {
            Ok(id) => ids.push(id),
            Err(e) => warn!(%conversation_id, error = %e, "failed to send caption message"),
        }
    }
    Ok(ids)
}

/// Plain-text rendering of a reacted-to event.
fn summarize(target: &RawEvent) -> String {
    let Ok(content) = deskbridge_core::event::parse_message_content(&target.content) else {
        return String::new();
    };
    match content {
        MessageContent::Text { body, .. } | MessageContent::Notice { body, .. } => body,
        MessageContent::Media(media) => media.body,
        MessageContent::Emote { body } => match target.sender.as_deref().map(|s| UserId::parse(s)) {
            Some(Ok(sender)) => markup::emote(&sender, &body),
            _ => body,
        },
        MessageContent::Unsupported { .. } => String::new(),
    }
}

async fn fetch_target(
    ctx: &BridgeContext,
    room_id: &RoomId,
    target: &EventId,
) -> Result<RawEvent, BridgeError> {
    let protocol = ctx.protocol.as_ref();
    let fetched = ctx
        .retry
        .run("fetch reacted-to event", move |_| protocol.get_event(room_id, target))
        .await
        .map_err(|e| match e {
            BridgeError::Protocol { message, status, source } => BridgeError::Protocol {
                message: format!("couldn't find reacted-to event {target}: {message}"),
                status,
                source,
            },
            other => other,
        })?;
    if !fetched.is_encrypted() {
        return Ok(fetched);
    }
    protocol.decrypt(room_id, &fetched).await
}

async fn handle_reaction(
    ctx: &Arc<BridgeContext>,
    event: &RoomEvent,
    relates_to: &EventId,
    key: &str,
) -> Result<(), BridgeError> {
    if already_linked(ctx, &event.event_id).await? {
        return Ok(());
    }
    let Some(conversation_id) = ctx.store.link_room(&event.room_id).await? else {
        debug!(room_id = %event.room_id, "no conversation for reaction");
        return Ok(());
    };

    let delivered = async {
        let target = fetch_target(ctx, &event.room_id, relates_to).await?;
        let text = format!(
            "{} reacted with {key} to \"{}\"",
            event.sender,
            summarize(&target)
        );
        send_text(ctx, conversation_id, &text, direction(ctx, &event.sender)).await
    }
    .await;

    match delivered {
        Ok(message_id) => record_links(ctx, &event.event_id, &[message_id]).await,
        Err(e) => {
            report_failure(ctx, conversation_id, REACTION_FAILURE_NOTE, &e, false).await;
            Err(e)
        }
    }
}

async fn handle_redaction(
    ctx: &Arc<BridgeContext>,
    event: &RoomEvent,
    redacts: &EventId,
) -> Result<(), BridgeError> {
    if ctx.store.redaction_processed(redacts).await? {
        debug!(%redacts, "redaction already processed");
        return Ok(());
    }
    let message_ids = ctx.store.message_ids_for_event(redacts).await?;
    if message_ids.is_empty() {
        debug!(%redacts, "no desk message for redacted event");
        return Ok(());
    }
    let Some(conversation_id) = ctx.store.link_room(&event.room_id).await? else {
        debug!(room_id = %event.room_id, "no conversation for redaction");
        return Ok(());
    };

    let desk = ctx.desk.as_ref();
    let mut failures = Vec::new();
    for message_id in message_ids {
        let result = ctx
            .retry
            .run("delete desk message", move |_| {
                desk.delete_message(conversation_id, message_id)
            })
            .await;
        match result {
            Ok(()) => info!(%conversation_id, %message_id, "deleted desk message"),
            Err(e) if e.status() == Some(404) => {
                debug!(%conversation_id, %message_id, "desk message already gone");
            }
            Err(e) => {
                warn!(%conversation_id, %message_id, error = %e, "failed to delete desk message");
                failures.push(e);
            }
        }
    }

    if !failures.is_empty() {
        return Err(BridgeError::Aggregate(failures));
    }
    ctx.store.record_redaction(&event.event_id, redacts).await
}

async fn handle_undecryptable(
    ctx: &Arc<BridgeContext>,
    event: &RoomEvent,
    reason: &str,
) -> Result<(), BridgeError> {
    let Some(conversation_id) = ctx.store.link_room(&event.room_id).await? else {
        warn!(event_id = %event.event_id, "undecryptable event in unlinked room");
        return Ok(());
    };
    let note = format!(
        "**Failed to decrypt Matrix event ({}). You probably missed a message!**\n\nError: {reason}",
        event.event_id
    );
    let note = note.as_str();
    let desk = ctx.desk.as_ref();
    ctx.retry
        .run("post decryption failure note", move |_| {
            desk.send_private_message(conversation_id, note)
        })
        .await?;
    Ok(())
}
