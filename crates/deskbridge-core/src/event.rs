// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol-side event model.
//!
//! [`RawEvent`] is the loosely-typed event as the homeserver delivers it.
//! [`RoomEvent`] is the closed, engine-facing form: every kind the bridge
//! understands is a variant of [`RoomEventKind`], so adding a kind is an
//! exhaustiveness error at every match site rather than a silent default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;
use crate::types::{EventId, OwnedEventId, OwnedMxcUri, OwnedRoomId, OwnedUserId, RoomId, UserId};

/// Content key carrying the sending client's type.
pub const ORIGIN_CLIENT_TYPE_KEY: &str = "com.beeper.origin_client_type";
/// Content key carrying the sending client's version.
pub const ORIGIN_CLIENT_VERSION_KEY: &str = "com.beeper.origin_client_version";

/// A timeline event as returned by the homeserver (sync, `/event`, decryption).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_server_ts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
}

impl RawEvent {
    /// Whether the homeserver reports this event as already redacted.
    pub fn is_redacted(&self) -> bool {
        self.unsigned
            .as_ref()
            .and_then(|u| u.get("redacted_because"))
            .is_some_and(|v| !v.is_null())
    }

    /// Whether this is an end-to-end encrypted envelope.
    pub fn is_encrypted(&self) -> bool {
        self.event_type == "m.room.encrypted"
    }

    fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }
}

/// Device metadata some clients attach to every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub client_type: String,
    pub client_version: String,
}

impl DeviceInfo {
    /// Desk custom-attribute key for this device type.
    pub fn attribute_key(&self) -> String {
        format!("{} version", self.client_type)
    }
}

/// An authorized protocol event, parsed into the kinds the engine translates.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent {
    pub event_id: OwnedEventId,
    pub room_id: OwnedRoomId,
    pub sender: OwnedUserId,
    pub origin_server_ts: Option<u64>,
    pub device: Option<DeviceInfo>,
    pub kind: RoomEventKind,
}

/// Closed set of event kinds the engine handles.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEventKind {
    Message(MessageContent),
    Reaction { relates_to: OwnedEventId, key: String },
    Redaction { redacts: OwnedEventId },
    /// An encrypted event the protocol client could not decrypt.
    Undecryptable { reason: String },
}

/// `m.room.message` content by `msgtype`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text { body: String, is_edit: bool },
    Notice { body: String, is_edit: bool },
    Emote { body: String },
    Media(MediaContent),
    Unsupported { msgtype: String },
}

/// Media kinds the protocol distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    File,
    Image,
    Video,
}

impl MediaKind {
    /// The `msgtype` string for this kind.
    pub fn msgtype(self) -> &'static str {
        match self {
            Self::Audio => "m.audio",
            Self::File => "m.file",
            Self::Image => "m.image",
            Self::Video => "m.video",
        }
    }

    /// Map a desk attachment `file_type` onto a media kind.
    pub fn from_desk_file_type(file_type: Option<&str>) -> Self {
        match file_type {
            Some("image") => Self::Image,
            Some("video") => Self::Video,
            Some("audio") => Self::Audio,
            _ => Self::File,
        }
    }
}

/// Media message content.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaContent {
    pub kind: MediaKind,
    pub body: String,
    pub filename: Option<String>,
    pub source: MediaSource,
    pub mimetype: Option<String>,
    pub size: Option<u64>,
}

impl MediaContent {
    /// Filename to use on the desk, and a caption when the body is separate text.
    pub fn filename_and_caption(&self) -> (String, Option<String>) {
        match &self.filename {
            Some(name) if !name.is_empty() => {
                let caption = (!self.body.is_empty() && self.body != *name).then(|| self.body.clone());
                (name.clone(), caption)
            }
            _ => (self.body.clone(), None),
        }
    }
}

/// Where media bytes live.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Plain(OwnedMxcUri),
    Encrypted(Box<EncryptedFile>),
}

impl MediaSource {
    pub fn uri(&self) -> &OwnedMxcUri {
        match self {
            Self::Plain(uri) => uri,
            Self::Encrypted(file) => &file.url,
        }
    }
}

/// Encrypted attachment envelope (`file` in message content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFile {
    pub url: OwnedMxcUri,
    pub key: JsonWebKey,
    pub iv: String,
    pub hashes: BTreeMap<String, String>,
    pub v: String,
}

/// Symmetric key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub key_ops: Vec<String>,
    pub alg: String,
    pub k: String,
    pub ext: bool,
}

/// Whether message content holds an attachment decryption key, either for
/// the file itself or its thumbnail. Such content may only go into an
/// encrypted room.
pub fn carries_attachment_key(content: &Value) -> bool {
    let has_key = |file: Option<&Value>| file.and_then(|f| f.get("key")).is_some();
    has_key(content.get("file"))
        || has_key(content.get("info").and_then(|info| info.get("thumbnail_file")))
}

fn parse_event_id(raw: &str) -> Result<OwnedEventId, BridgeError> {
    EventId::parse(raw).map_err(|e| BridgeError::Validation(format!("invalid event ID {raw:?}: {e}")))
}

impl RoomEvent {
    /// Parse a raw timeline event.
    ///
    /// Returns `Ok(None)` for event types the engine does not translate
    /// (state events, receipts, call signalling, ...).
    pub fn from_raw(room_id: &RoomId, raw: &RawEvent) -> Result<Option<Self>, BridgeError> {
        let kind = match raw.event_type.as_str() {
            "m.room.message" if raw.state_key.is_none() => {
                RoomEventKind::Message(parse_message_content(&raw.content)?)
            }
            "m.reaction" => {
                let relation = raw.content.get("m.relates_to");
                let target = relation
                    .and_then(|r| r.get("event_id"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| BridgeError::Validation("reaction without target event".into()))?;
                let key = relation
                    .and_then(|r| r.get("key"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                RoomEventKind::Reaction {
                    relates_to: parse_event_id(target)?,
                    key,
                }
            }
            "m.room.redaction" => {
                let target = raw
                    .redacts
                    .as_deref()
                    .or_else(|| raw.content_str("redacts"))
                    .ok_or_else(|| BridgeError::Validation("redaction without target".into()))?;
                RoomEventKind::Redaction {
                    redacts: parse_event_id(target)?,
                }
            }
            _ => return Ok(None),
        };

        let event_id = raw
            .event_id
            .as_deref()
            .ok_or_else(|| BridgeError::Validation("event without event_id".into()))?;
        let sender = raw
            .sender
            .as_deref()
            .ok_or_else(|| BridgeError::Validation("event without sender".into()))?;

        Ok(Some(Self {
            event_id: parse_event_id(event_id)?,
            room_id: room_id.to_owned(),
            sender: UserId::parse(sender)
                .map_err(|e| BridgeError::Validation(format!("invalid sender {sender:?}: {e}")))?,
            origin_server_ts: raw.origin_server_ts,
            device: device_info(&raw.content),
            kind,
        }))
    }

    /// Build the placeholder for an encrypted event that failed to decrypt.
    pub fn undecryptable(
        room_id: &RoomId,
        raw: &RawEvent,
        reason: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let event_id = raw
            .event_id
            .as_deref()
            .ok_or_else(|| BridgeError::Validation("event without event_id".into()))?;
        let sender = raw
            .sender
            .as_deref()
            .ok_or_else(|| BridgeError::Validation("event without sender".into()))?;
        Ok(Self {
            event_id: parse_event_id(event_id)?,
            room_id: room_id.to_owned(),
            sender: UserId::parse(sender)
                .map_err(|e| BridgeError::Validation(format!("invalid sender {sender:?}: {e}")))?,
            origin_server_ts: raw.origin_server_ts,
            device: None,
            kind: RoomEventKind::Undecryptable {
                reason: reason.into(),
            },
        })
    }
}

fn device_info(content: &Value) -> Option<DeviceInfo> {
    let client_type = content.get(ORIGIN_CLIENT_TYPE_KEY)?.as_str()?;
    let client_version = content.get(ORIGIN_CLIENT_VERSION_KEY)?.as_str()?;
    if client_type.is_empty() || client_version.is_empty() {
        return None;
    }
    Some(DeviceInfo {
        client_type: client_type.to_string(),
        client_version: client_version.to_string(),
    })
}

/// Parse `m.room.message` content into a [`MessageContent`].
pub fn parse_message_content(content: &Value) -> Result<MessageContent, BridgeError> {
    let msgtype = content.get("msgtype").and_then(Value::as_str).unwrap_or_default();
    let body = content
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let is_edit = content
        .get("m.relates_to")
        .and_then(|r| r.get("rel_type"))
        .and_then(Value::as_str)
        == Some("m.replace");

    let media_kind = match msgtype {
        "m.text" => return Ok(MessageContent::Text { body, is_edit }),
        "m.notice" => return Ok(MessageContent::Notice { body, is_edit }),
        "m.emote" => return Ok(MessageContent::Emote { body }),
        "m.audio" => MediaKind::Audio,
        "m.file" => MediaKind::File,
        "m.image" => MediaKind::Image,
        "m.video" => MediaKind::Video,
        other => {
            return Ok(MessageContent::Unsupported {
                msgtype: other.to_string(),
            });
        }
    };

    let source = match content.get("file") {
        Some(file) if !file.is_null() => {
            let file: EncryptedFile = serde_json::from_value(file.clone())
                .map_err(|e| BridgeError::Validation(format!("malformed encrypted file: {e}")))?;
            MediaSource::Encrypted(Box::new(file))
        }
        _ => {
            let url = content
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| BridgeError::Validation("media message without url".into()))?;
            MediaSource::Plain(OwnedMxcUri::from(url))
        }
    };
    let info = content.get("info");

    Ok(MessageContent::Media(MediaContent {
        kind: media_kind,
        body,
        filename: content
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string),
        source,
        mimetype: info
            .and_then(|i| i.get("mimetype"))
            .and_then(Value::as_str)
            .map(str::to_string),
        size: info.and_then(|i| i.get("size")).and_then(Value::as_u64),
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn room() -> OwnedRoomId {
        RoomId::parse("!dm:example.org").unwrap()
    }

    fn raw(value: Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_edit_is_detected() {
        let event = raw(json!({
            "type": "m.room.message",
            "event_id": "$edit",
            "sender": "@alice:example.org",
            "content": {
                "msgtype": "m.text",
                "body": " * fixed typo",
                "m.relates_to": {"rel_type": "m.replace", "event_id": "$orig"}
            }
        }));
        let parsed = RoomEvent::from_raw(&room(), &event).unwrap().unwrap();
        assert_eq!(
            parsed.kind,
            RoomEventKind::Message(MessageContent::Text {
                body: " * fixed typo".into(),
                is_edit: true
            })
        );
    }

    #[test]
    fn reaction_and_redaction_targets_are_parsed() {
        let reaction = raw(json!({
            "type": "m.reaction",
            "event_id": "$r",
            "sender": "@alice:example.org",
            "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": "$t", "key": "👍"}}
        }));
        let parsed = RoomEvent::from_raw(&room(), &reaction).unwrap().unwrap();
        assert!(matches!(parsed.kind, RoomEventKind::Reaction { ref key, .. } if key == "👍"));

        let redaction = raw(json!({
            "type": "m.room.redaction",
            "event_id": "$x",
            "sender": "@alice:example.org",
            "content": {"redacts": "$t"}
        }));
        let parsed = RoomEvent::from_raw(&room(), &redaction).unwrap().unwrap();
        assert_eq!(
            parsed.kind,
            RoomEventKind::Redaction {
                redacts: EventId::parse("$t").unwrap()
            }
        );
    }

    #[test]
    fn state_events_are_not_translated() {
        let member = raw(json!({
            "type": "m.room.member",
            "event_id": "$m",
            "sender": "@alice:example.org",
            "state_key": "@alice:example.org",
            "content": {"membership": "join"}
        }));
        assert!(RoomEvent::from_raw(&room(), &member).unwrap().is_none());
    }

    #[test]
    fn encrypted_media_and_caption() {
        let content = json!({
            "msgtype": "m.image",
            "body": "look at this",
            "filename": "cat.png",
            "info": {"mimetype": "image/png", "size": 10},
            "file": {
                "url": "mxc://example.org/abc",
                "key": {"kty": "oct", "key_ops": ["encrypt", "decrypt"], "alg": "A256CTR", "k": "AAAA", "ext": true},
                "iv": "AAAAAAAAAAAAAAAAAAAAAA",
                "hashes": {"sha256": "abc"},
                "v": "v2"
            }
        });
        let MessageContent::Media(media) = parse_message_content(&content).unwrap() else {
            panic!("expected media");
        };
        assert_eq!(media.kind, MediaKind::Image);
        assert!(matches!(media.source, MediaSource::Encrypted(_)));
        assert_eq!(media.size, Some(10));
        assert_eq!(
            media.filename_and_caption(),
            ("cat.png".to_string(), Some("look at this".to_string()))
        );
    }

    #[test]
    fn plain_media_uses_body_as_filename() {
        let content = json!({"msgtype": "m.file", "body": "report.pdf", "url": "mxc://example.org/f"});
        let MessageContent::Media(media) = parse_message_content(&content).unwrap() else {
            panic!("expected media");
        };
        assert_eq!(media.filename_and_caption(), ("report.pdf".to_string(), None));
        assert_eq!(media.source.uri().as_str(), "mxc://example.org/f");
    }

    #[test]
    fn device_metadata_is_extracted() {
        let event = raw(json!({
            "type": "m.room.message",
            "event_id": "$d",
            "sender": "@alice:example.org",
            "content": {
                "msgtype": "m.text",
                "body": "hi",
                "com.beeper.origin_client_type": "android",
                "com.beeper.origin_client_version": "4.2.0"
            }
        }));
        let parsed = RoomEvent::from_raw(&room(), &event).unwrap().unwrap();
        let device = parsed.device.unwrap();
        assert_eq!(device.attribute_key(), "android version");
        assert_eq!(device.client_version, "4.2.0");
    }

    #[test]
    fn redacted_flag_reads_unsigned() {
        let event = raw(json!({
            "type": "m.room.message",
            "event_id": "$d",
            "sender": "@alice:example.org",
            "content": {},
            "unsigned": {"redacted_because": {"type": "m.room.redaction"}}
        }));
        assert!(event.is_redacted());
    }

    #[test]
    fn attachment_keys_are_detected_in_file_and_thumbnail() {
        let plain = json!({"msgtype": "m.image", "url": "mxc://x.org/a", "info": {"thumbnail_url": "mxc://x.org/t"}});
        assert!(!carries_attachment_key(&plain));

        let file = json!({"msgtype": "m.image", "file": {"url": "mxc://x.org/a", "key": {"k": "secret"}}});
        assert!(carries_attachment_key(&file));

        let thumb = json!({"msgtype": "m.image", "url": "mxc://x.org/a", "info": {"thumbnail_file": {"key": {"k": "secret"}}}});
        assert!(carries_attachment_key(&thumb));
    }
}
