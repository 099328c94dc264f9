// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment pipeline in both directions.
//!
//! Protocol to desk: download (the protocol client decrypts when the event
//! carries an encryption envelope), check the declared size, pick a MIME type.
//! Desk to protocol: download, check the declared size, sniff type and
//! dimensions, upload (encrypted when the room is), and describe the result
//! as message content.

use std::io::Cursor;

use deskbridge_core::desk::Attachment;
use deskbridge_core::event::{MediaContent, MediaKind, MediaSource};
use deskbridge_core::traits::AttachmentUpload;
use deskbridge_core::types::{MessageId, RoomId};
use deskbridge_core::BridgeError;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::context::BridgeContext;
use crate::markup;

pub const DESK_MESSAGE_ID_KEY: &str = "com.beeper.chatwoot.message_id";
pub const DESK_ATTACHMENT_ID_KEY: &str = "com.beeper.chatwoot.attachment_id";

const OCTET_STREAM: &str = "application/octet-stream";

/// Content type and, for images, pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Detect the type of `data`, falling back to the filename extension.
pub fn sniff(data: &[u8], filename: Option<&str>) -> Sniffed {
    if let Ok(format) = image::guess_format(data) {
        let dimensions = image::io::Reader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());
        return Sniffed {
            mime: format.to_mime_type().to_string(),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
        };
    }
    let mime = filename
        .map(|name| mime_guess::from_path(name).first_or_octet_stream().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string());
    Sniffed {
        mime,
        width: None,
        height: None,
    }
}

fn check_size(declared: Option<u64>, actual: usize, what: &str) -> Result<(), BridgeError> {
    match declared {
        Some(expected) if expected != actual as u64 => Err(BridgeError::Validation(format!(
            "{what} size ({actual}) does not match declared size ({expected})"
        ))),
        _ => Ok(()),
    }
}

/// Plaintext bytes of a protocol media message, ready for the desk.
pub async fn fetch_protocol_media(
    ctx: &BridgeContext,
    media: &MediaContent,
) -> Result<AttachmentUpload, BridgeError> {
    let uri = media.source.uri();
    uri.validate()
        .map_err(|e| BridgeError::Validation(format!("malformed content URI {uri}: {e}")))?;

    let protocol = ctx.protocol.as_ref();
    let source = &media.source;
    let data = ctx
        .retry
        .run("download protocol media", move |_| protocol.download_media(source))
        .await?;
    check_size(media.size, data.len(), "media")?;

    let (filename, _) = media.filename_and_caption();
    let mime_type = match media.mimetype.as_deref() {
        Some(mime) if !mime.is_empty() => mime.to_string(),
        _ => sniff(&data, Some(filename.as_str())).mime,
    };
    debug!(%mime_type, size = data.len(), "fetched protocol media");

    Ok(AttachmentUpload {
        filename,
        mime_type,
        data,
    })
}

/// Whether protocol media sent to `room_id` must be encrypted.
///
/// A cached `true` is trusted. Anything else is confirmed against the room's
/// encryption state, and a positive answer is cached.
pub async fn room_is_encrypted(ctx: &BridgeContext, room_id: &RoomId) -> Result<bool, BridgeError> {
    if ctx.store.is_encrypted(room_id).await? == Some(true) {
        return Ok(true);
    }
    let protocol = ctx.protocol.as_ref();
    let state = ctx
        .retry
        .run("read room encryption state", move |_| {
            protocol.get_state_event(room_id, "m.room.encryption", "")
        })
        .await?;
    let encrypted = state.is_some();
    if encrypted && let Err(e) = ctx.store.set_encrypted(room_id, true).await {
        warn!(%room_id, error = %e, "failed to cache room encryption flag");
    }
    Ok(encrypted)
}

/// Upload `data`, encrypted when the room is. Returns the JSON key (`url` or
/// `file`) and value describing where the bytes live.
async fn upload(
    ctx: &BridgeContext,
    data: Vec<u8>,
    mime: &str,
    filename: Option<&str>,
    encrypted: bool,
) -> Result<(&'static str, Value), BridgeError> {
    let protocol = ctx.protocol.as_ref();
    let what = if encrypted { "upload encrypted media" } else { "upload media" };
    let source = ctx
        .retry
        .run(what, move |_| {
            protocol.upload_media(data.clone(), mime, filename, encrypted)
        })
        .await?;
    match (source, encrypted) {
        (MediaSource::Plain(uri), false) => Ok(("url", Value::String(uri.to_string()))),
        (MediaSource::Encrypted(file), true) => {
            let file = serde_json::to_value(file)
                .map_err(|e| BridgeError::Internal(format!("serialize encrypted file: {e}")))?;
            Ok(("file", file))
        }
        (_, encrypted) => Err(BridgeError::Internal(format!(
            "protocol client returned the wrong media source kind (encrypted upload requested: {encrypted})"
        ))),
    }
}

fn image_info(sniffed: &Sniffed, size: usize) -> Map<String, Value> {
    let mut info = Map::new();
    info.insert("mimetype".into(), json!(sniffed.mime));
    info.insert("size".into(), json!(size));
    if let (Some(w), Some(h)) = (sniffed.width, sniffed.height) {
        info.insert("w".into(), json!(w));
        info.insert("h".into(), json!(h));
    }
    info
}

async fn attach_thumbnail(
    ctx: &BridgeContext,
    url: &str,
    encrypted: bool,
    info: &mut Map<String, Value>,
) -> Result<(), BridgeError> {
    let desk = ctx.desk.as_ref();
    let data = ctx
        .retry
        .run("download attachment thumbnail", move |_| desk.download_attachment(url))
        .await?;
    let sniffed = sniff(&data, markup::filename_from_url(url));
    let thumb_info = image_info(&sniffed, data.len());
    let (key, value) = upload(ctx, data, &sniffed.mime, None, encrypted).await?;
    info.insert("thumbnail_info".into(), Value::Object(thumb_info));
    let key = if key == "file" { "thumbnail_file" } else { "thumbnail_url" };
    info.insert(key.into(), value);
    Ok(())
}

/// Download a desk attachment and build the `m.room.message` content for it.
pub async fn desk_attachment_content(
    ctx: &BridgeContext,
    room_id: &RoomId,
    message_id: MessageId,
    attachment: &Attachment,
) -> Result<Value, BridgeError> {
    let desk = ctx.desk.as_ref();
    let url = attachment.data_url.as_str();
    let data = ctx
        .retry
        .run("download desk attachment", move |_| desk.download_attachment(url))
        .await?;
    check_size(attachment.file_size, data.len(), "downloaded attachment")?;

    let filename = markup::filename_from_url(url).unwrap_or("unknown").to_string();
    let sniffed = sniff(&data, Some(filename.as_str()));
    debug!(attachment_id = %attachment.id, mime = %sniffed.mime, "downloaded desk attachment");

    let encrypted = room_is_encrypted(ctx, room_id).await?;
    let mut info = image_info(&sniffed, data.len());

    if let Some(thumb) = attachment.thumbnail_url()
        && let Err(e) = attach_thumbnail(ctx, thumb, encrypted, &mut info).await
    {
        warn!(attachment_id = %attachment.id, error = %e, "skipping attachment thumbnail");
    }

    let (key, value) = upload(ctx, data, &sniffed.mime, Some(filename.as_str()), encrypted).await?;
    let kind = MediaKind::from_desk_file_type(attachment.file_type.as_deref());

    let mut content = Map::new();
    content.insert("msgtype".into(), json!(kind.msgtype()));
    content.insert("body".into(), json!(filename));
    content.insert("filename".into(), json!(filename));
    content.insert("info".into(), Value::Object(info));
    content.insert(key.into(), value);
    content.insert(DESK_MESSAGE_ID_KEY.into(), json!(message_id));
    content.insert(DESK_ATTACHMENT_ID_KEY.into(), json!(attachment.id));
    Ok(Value::Object(content))
}
