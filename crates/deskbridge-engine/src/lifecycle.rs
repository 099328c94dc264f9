// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle: find or create the desk conversation for a room,
//! and find or provision the room for a desk conversation.
//!
//! Creation in either direction runs under one process-wide lock and
//! re-checks the link after acquiring it, so concurrent first events for a
//! new room produce exactly one conversation.

use std::sync::Arc;

use deskbridge_core::desk::{Conversation, ROOM_ID_ATTRIBUTE};
use deskbridge_core::event::RoomEvent;
use deskbridge_core::types::{ContactId, ConversationId, OwnedRoomId, OwnedUserId, RoomId, UserId};
use deskbridge_core::BridgeError;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::background;
use crate::context::BridgeContext;
use crate::markup;

/// State event type carrying the linked conversation ID.
pub const CONVERSATION_STATE_EVENT: &str = "org.deskbridge.conversation_id";

/// The conversation linked to `event`'s room, creating it on first contact.
pub async fn resolve_or_create(
    ctx: &Arc<BridgeContext>,
    event: &RoomEvent,
) -> Result<ConversationId, BridgeError> {
    let room_id: &RoomId = &event.room_id;
    if let Some(id) = ctx.store.link_room(room_id).await? {
        return Ok(id);
    }

    let _creation = ctx.creation_lock.lock().await;
    debug!(%room_id, "acquired conversation creation lock");
    if let Some(id) = ctx.store.link_room(room_id).await? {
        return Ok(id);
    }

    let counterpart = counterpart(ctx, room_id, &event.sender).await?;
    let contact_id = find_or_create_contact(ctx, &counterpart).await?;

    let mut attributes = Map::new();
    attributes.insert(ROOM_ID_ATTRIBUTE.into(), json!(room_id.as_str()));
    if let Some(device) = &event.device {
        attributes.insert(device.attribute_key(), json!(device.client_version));
    }

    info!(%room_id, %contact_id, "creating desk conversation");
    let conversation_id = create_conversation(ctx, room_id, contact_id, attributes).await?;
    ctx.store.upsert_link(room_id, conversation_id).await?;
    info!(%room_id, %conversation_id, "linked room to new conversation");

    publish_conversation_state(ctx, room_id, conversation_id).await;
    maybe_label_canonical_dm(ctx, room_id, conversation_id).await;

    Ok(conversation_id)
}

/// Joined members, read from the sync cache or fetched when the cache is empty.
async fn members(
    ctx: &BridgeContext,
    room_id: &RoomId,
    live: bool,
) -> Result<Vec<OwnedUserId>, BridgeError> {
    if !live {
        let cached = ctx.store.joined_members(room_id).await?;
        if !cached.is_empty() {
            return Ok(cached);
        }
    }
    let protocol = ctx.protocol.as_ref();
    let fetched = ctx
        .retry
        .run("fetch joined members", move |_| protocol.joined_members(room_id))
        .await?;
    ctx.store.replace_joined_members(room_id, &fetched).await?;
    Ok(fetched)
}

/// The human this room's conversation belongs to.
///
/// Events from humans name themselves. Events from the bot name the single
/// other joined member; the cached membership is re-checked live once before
/// giving up.
async fn counterpart(
    ctx: &BridgeContext,
    room_id: &RoomId,
    sender: &UserId,
) -> Result<OwnedUserId, BridgeError> {
    let bot = ctx.protocol.bot_user_id();
    let mut live = false;
    loop {
        let joined = members(ctx, room_id, live).await?;
        if ctx.settings.rejects_member_count(joined.len()) {
            warn!(
                %room_id,
                member_count = joined.len(),
                limit = ctx.settings.bridge_if_members_less_than,
                "not creating conversation for room with too many members"
            );
            return Err(BridgeError::Policy(format!(
                "room {room_id} has {} members",
                joined.len()
            )));
        }

        if sender != bot {
            return Ok(sender.to_owned());
        }

        let others: Vec<&OwnedUserId> = joined.iter().filter(|m| m.as_str() != bot.as_str()).collect();
        if let [only] = others.as_slice() {
            return Ok((*only).clone());
        }
        if live {
            if others.is_empty() {
                warn!(%room_id, "leaving room where only the bot remains");
                let protocol = ctx.protocol.as_ref();
                if let Err(e) = ctx
                    .retry
                    .run("leave empty room", move |_| protocol.leave_room(room_id))
                    .await
                {
                    warn!(%room_id, error = %e, "failed to leave room");
                }
                return Err(BridgeError::Policy(format!(
                    "room {room_id} has no members besides the bot"
                )));
            }
            warn!(%room_id, member_count = joined.len(), "not creating conversation for non-DM room");
            return Err(BridgeError::Policy(format!(
                "room {room_id} has no single counterpart for the bot"
            )));
        }
        warn!(%room_id, "cached membership is not a DM, re-fetching joined members");
        live = true;
    }
}

async fn find_or_create_contact(
    ctx: &BridgeContext,
    identity: &UserId,
) -> Result<ContactId, BridgeError> {
    let desk = ctx.desk.as_ref();
    let existing = ctx
        .retry
        .run("find desk contact", move |_| desk.find_contact_by_identity(identity))
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let display_name = markup::contact_display_name(identity);
    let display_name = display_name.as_str();
    let id = ctx
        .retry
        .run("create desk contact", move |attempt| async move {
            if attempt > 1
                && let Some(id) = desk.find_contact_by_identity(identity).await?
            {
                return Ok(id);
            }
            desk.create_contact(identity, display_name).await
        })
        .await?;
    info!(contact_id = %id, %identity, "created desk contact");
    Ok(id)
}

async fn create_conversation(
    ctx: &BridgeContext,
    room_id: &RoomId,
    contact_id: ContactId,
    attributes: Map<String, Value>,
) -> Result<ConversationId, BridgeError> {
    let desk = ctx.desk.as_ref();
    ctx.retry
        .run("create desk conversation", move |attempt| {
            let attributes = attributes.clone();
            async move {
                if attempt > 1
                    && let Some(id) = desk.find_conversation_for_source(contact_id, room_id).await?
                {
                    info!(%room_id, conversation_id = %id, "found conversation from earlier attempt");
                    return Ok(id);
                }
                desk.create_conversation(room_id, contact_id, attributes)
                    .await
                    .map(|c| c.id)
            }
        })
        .await
}

/// Publish the conversation ID into room state. Failures are logged.
pub async fn publish_conversation_state(
    ctx: &BridgeContext,
    room_id: &RoomId,
    conversation_id: ConversationId,
) {
    let protocol = ctx.protocol.as_ref();
    let result = ctx
        .retry
        .run("publish conversation ID state", move |_| {
            protocol.send_state_event(
                room_id,
                CONVERSATION_STATE_EVENT,
                "",
                json!({ "conversation_id": conversation_id }),
            )
        })
        .await;
    if let Err(e) = result {
        warn!(%room_id, %conversation_id, error = %e, "failed to publish conversation ID state event");
    }
}

async fn maybe_label_canonical_dm(
    ctx: &Arc<BridgeContext>,
    room_id: &RoomId,
    conversation_id: ConversationId,
) {
    let Some(prefix) = ctx.settings.canonical_dm_prefix.as_deref() else {
        return;
    };
    let protocol = ctx.protocol.as_ref();
    let name = match ctx
        .retry
        .run("read room name", move |_| protocol.get_state_event(room_id, "m.room.name", ""))
        .await
    {
        Ok(state) => state
            .as_ref()
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Err(e) => {
            warn!(%room_id, error = %e, "failed to read room name");
            return;
        }
    };
    if name.is_some_and(|n| n.starts_with(prefix)) {
        background::spawn_canonical_dm_label(ctx, conversation_id);
    }
}

/// The room linked to `conversation`, provisioning one when enabled.
///
/// Returns [`BridgeError::NotFound`] when nothing is linked and provisioning
/// is disabled.
pub async fn resolve_room(
    ctx: &BridgeContext,
    conversation: &Conversation,
) -> Result<OwnedRoomId, BridgeError> {
    if let Some(link) = ctx.store.link_conversation(conversation.id).await? {
        return Ok(link.room_id);
    }
    let Some(provisioner) = ctx.provisioner.as_deref() else {
        return Err(BridgeError::NotFound(format!(
            "no room linked to conversation {}",
            conversation.id
        )));
    };

    let _creation = ctx.creation_lock.lock().await;
    if let Some(link) = ctx.store.link_conversation(conversation.id).await? {
        return Ok(link.room_id);
    }

    let contact = conversation.meta.sender.as_ref().ok_or_else(|| {
        BridgeError::Validation(format!(
            "conversation {} has no contact to start a chat with",
            conversation.id
        ))
    })?;

    // Provisioning is not idempotent, so it is attempted once.
    let room_id = provisioner.provision_room(contact).await?;
    ctx.store.upsert_link(&room_id, conversation.id).await?;
    info!(%room_id, conversation_id = %conversation.id, "provisioned room for conversation");
    Ok(room_id)
}
