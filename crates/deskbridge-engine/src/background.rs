// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort side work detached from the translators.
//!
//! Each task runs on the context's tracker so shutdown can drain it, and
//! logs its own failures. Nothing here affects message links.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use deskbridge_core::event::DeviceInfo;
use deskbridge_core::types::{ConversationId, OwnedRoomId};
use deskbridge_core::BridgeError;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::context::BridgeContext;
use crate::markup;

/// Label applied to canonical DM conversations.
pub const CANONICAL_DM_LABEL: &str = "canonical-dm";

/// Stored device versions look like `4.2.0 (last updated at 2026-01-01 10:00:00 UTC)`.
static DEVICE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S+)( \(last updated at .*\))?").unwrap());

/// Add the canonical-DM label after the configured settling delay.
pub fn spawn_canonical_dm_label(ctx: &Arc<BridgeContext>, conversation_id: ConversationId) {
    let ctx = Arc::clone(ctx);
    ctx.tasks.clone().spawn(async move {
        let cancel = ctx.retry.cancellation().clone();
        tokio::select! {
            _ = tokio::time::sleep(ctx.settings.canonical_dm_label_delay) => {}
            _ = cancel.cancelled() => {
                debug!(%conversation_id, "shutdown before canonical-dm labelling");
                return;
            }
        }
        if let Err(e) = add_label(&ctx, conversation_id, CANONICAL_DM_LABEL).await {
            warn!(%conversation_id, error = %e, "failed to add canonical-dm label");
        }
    });
}

async fn add_label(
    ctx: &BridgeContext,
    conversation_id: ConversationId,
    label: &str,
) -> Result<(), BridgeError> {
    let desk = ctx.desk.as_ref();
    let mut labels = ctx
        .retry
        .run("list conversation labels", move |_| {
            desk.get_conversation_labels(conversation_id)
        })
        .await?;
    if labels.iter().any(|l| l == label) {
        return Ok(());
    }
    labels.push(label.to_string());
    info!(%conversation_id, ?labels, "setting conversation labels");
    let labels = labels.as_slice();
    ctx.retry
        .run("set conversation labels", move |_| {
            desk.set_conversation_labels(conversation_id, labels)
        })
        .await
}

/// Post a private note linking every ticket reference in `body`.
pub fn spawn_ticket_links(ctx: &Arc<BridgeContext>, conversation_id: ConversationId, body: &str) {
    let Some(base) = ctx.settings.ticket_link_base.as_deref() else {
        return;
    };
    let links = markup::ticket_links(body, base);
    if links.is_empty() {
        return;
    }
    let ctx = Arc::clone(ctx);
    ctx.tasks.clone().spawn(async move {
        let note = links.join("\n\n");
        let note = note.as_str();
        let desk = ctx.desk.as_ref();
        let result = ctx
            .retry
            .run("post ticket links", move |_| {
                desk.send_private_message(conversation_id, note)
            })
            .await;
        if let Err(e) = result {
            warn!(%conversation_id, error = %e, "failed to post ticket links");
        }
    });
}

/// Current device version recorded in a custom attribute value.
fn recorded_version(value: &str) -> Option<&str> {
    DEVICE_VERSION
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Refresh the `<type> version` custom attribute when the device changed.
pub fn spawn_device_update(ctx: &Arc<BridgeContext>, room_id: OwnedRoomId, device: DeviceInfo) {
    let ctx = Arc::clone(ctx);
    ctx.tasks.clone().spawn(async move {
        if let Err(e) = update_device(&ctx, &room_id, &device).await {
            warn!(%room_id, error = %e, "failed to update device custom attribute");
        }
    });
}

async fn update_device(
    ctx: &BridgeContext,
    room_id: &OwnedRoomId,
    device: &DeviceInfo,
) -> Result<(), BridgeError> {
    let Some(conversation_id) = ctx.store.link_room(room_id).await? else {
        return Ok(());
    };
    let desk = ctx.desk.as_ref();
    let conversation = ctx
        .retry
        .run("get conversation", move |_| desk.get_conversation(conversation_id))
        .await?;

    let key = device.attribute_key();
    let mut attributes = conversation.custom_attributes;
    let current = attributes.get(&key).and_then(Value::as_str).and_then(recorded_version);
    if current == Some(device.client_version.as_str()) {
        return Ok(());
    }

    let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    attributes.insert(
        key.clone(),
        json!(format!("{} (last updated at {now})", device.client_version)),
    );
    debug!(%conversation_id, device_type = %key, version = %device.client_version, "setting device custom attribute");
    ctx.retry
        .run("set device custom attribute", move |_| {
            desk.set_conversation_custom_attributes(conversation_id, attributes.clone())
        })
        .await
}
