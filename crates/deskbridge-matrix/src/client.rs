// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matrix client backed by `matrix-sdk`.
//!
//! Provides [`MatrixClient`], the [`ProtocolClient`] implementation the
//! engine talks to. The SDK owns the session, the crypto store and the room
//! state cache: sends into encrypted rooms are encrypted by the SDK,
//! timeline events arrive decrypted, and encrypted attachments are produced
//! with the SDK's attachment encryptor.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use deskbridge_core::error::BridgeError;
use deskbridge_core::event::{EncryptedFile, MediaSource, RawEvent, carries_attachment_key};
use deskbridge_core::traits::ProtocolClient;
use deskbridge_core::types::{
    EventId, OwnedEventId, OwnedMxcUri, OwnedUserId, RoomId, TransactionId, UserId,
};
use matrix_sdk::authentication::matrix::MatrixSession;
use matrix_sdk::config::SyncSettings;
use matrix_sdk::deserialized_responses::RawAnySyncOrStrippedState;
use matrix_sdk::media::{MediaFormat, MediaRequestParameters};
use matrix_sdk::ruma::api::client::receipt::create_receipt::v3::ReceiptType;
use matrix_sdk::ruma::events::StateEventType;
use matrix_sdk::ruma::events::receipt::ReceiptThread;
use matrix_sdk::ruma::events::room as sdk_room;
use matrix_sdk::ruma::serde::Raw;
use matrix_sdk::{Client, HttpError, Room, RoomMemberships, SessionMeta, SessionTokens};
use serde_json::Value;
use tracing::{debug, info};

use crate::sync::SyncBatch;

/// Connection settings for [`MatrixClient::connect`].
#[derive(Debug, Clone)]
pub struct MatrixSettings {
    pub homeserver_url: String,
    pub bot_user_id: OwnedUserId,
    pub device_id: String,
    pub access_token: String,
    /// Directory of the SDK's SQLite state and crypto store.
    pub store_path: PathBuf,
    pub store_passphrase: Option<String>,
}

/// Matrix client authenticated as the bridge bot.
#[derive(Debug, Clone)]
pub struct MatrixClient {
    client: Client,
    bot_user_id: OwnedUserId,
}

// Core identifiers are plain `ruma` types; the SDK pins its own `ruma`, so
// identifiers cross the boundary as strings.

fn sdk_room_id(room_id: &RoomId) -> Result<matrix_sdk::ruma::OwnedRoomId, BridgeError> {
    matrix_sdk::ruma::RoomId::parse(room_id.as_str())
        .map_err(|e| BridgeError::Validation(format!("invalid room ID {room_id}: {e}")))
}

fn sdk_event_id(event_id: &EventId) -> Result<matrix_sdk::ruma::OwnedEventId, BridgeError> {
    matrix_sdk::ruma::EventId::parse(event_id.as_str())
        .map_err(|e| BridgeError::Validation(format!("invalid event ID {event_id}: {e}")))
}

fn core_event_id(event_id: &matrix_sdk::ruma::EventId) -> Result<OwnedEventId, BridgeError> {
    EventId::parse(event_id.as_str())
        .map_err(|e| BridgeError::protocol(format!("homeserver returned invalid event ID: {e}")))
}

fn http_status(error: &HttpError) -> Option<u16> {
    error
        .as_client_api_error()
        .map(|api| api.status_code.as_u16())
}

fn sdk_err(context: &str, error: matrix_sdk::Error) -> BridgeError {
    let status = match &error {
        matrix_sdk::Error::Http(http) => http_status(http),
        _ => None,
    };
    BridgeError::Protocol {
        message: format!("{context}: {error}"),
        status,
        source: Some(Box::new(error)),
    }
}

fn http_err(context: &str, error: HttpError) -> BridgeError {
    BridgeError::Protocol {
        message: format!("{context}: {error}"),
        status: http_status(&error),
        source: Some(Box::new(error)),
    }
}

fn store_err(context: &str, error: impl std::fmt::Display) -> BridgeError {
    BridgeError::protocol(format!("{context}: {error}"))
}

/// Parse a serialized event the SDK handed back into the core model.
pub(crate) fn raw_event<T>(raw: &Raw<T>) -> Result<RawEvent, BridgeError> {
    serde_json::from_str(raw.json().get())
        .map_err(|e| BridgeError::protocol(format!("malformed event from homeserver: {e}")))
}

/// Map a core media source onto the SDK's.
fn sdk_media_source(source: &MediaSource) -> Result<sdk_room::MediaSource, BridgeError> {
    match source {
        MediaSource::Plain(uri) => Ok(sdk_room::MediaSource::Plain(
            matrix_sdk::ruma::OwnedMxcUri::from(uri.as_str()),
        )),
        MediaSource::Encrypted(file) => {
            let json = serde_json::to_value(file.as_ref())
                .map_err(|e| BridgeError::Internal(format!("serialize encrypted file: {e}")))?;
            let file: sdk_room::EncryptedFile = serde_json::from_value(json)
                .map_err(|e| BridgeError::Validation(format!("malformed encrypted file: {e}")))?;
            Ok(sdk_room::MediaSource::Encrypted(Box::new(file)))
        }
    }
}

fn core_encrypted_file(file: &sdk_room::EncryptedFile) -> Result<EncryptedFile, BridgeError> {
    let json = serde_json::to_value(file)
        .map_err(|e| BridgeError::Internal(format!("serialize encrypted file: {e}")))?;
    serde_json::from_value(json)
        .map_err(|e| BridgeError::protocol(format!("SDK produced an unexpected encrypted file: {e}")))
}

fn state_content(state: &RawAnySyncOrStrippedState) -> Option<Value> {
    let content = match state {
        RawAnySyncOrStrippedState::Sync(raw) => raw.get_field::<Value>("content"),
        RawAnySyncOrStrippedState::Stripped(raw) => raw.get_field::<Value>("content"),
    };
    content.ok().flatten()
}

/// Attachment keys only ever travel inside encrypted rooms.
fn guard_attachment_key(room_id: &RoomId, room_encrypted: bool) -> Result<(), BridgeError> {
    if room_encrypted {
        return Ok(());
    }
    Err(BridgeError::Policy(format!(
        "refusing to send an attachment key into unencrypted room {room_id}"
    )))
}

fn parse_mime(content_type: &str) -> mime::Mime {
    content_type
        .parse()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

impl MatrixClient {
    /// Open the SDK store and restore the bot's session.
    pub async fn connect(settings: &MatrixSettings) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .homeserver_url(&settings.homeserver_url)
            .sqlite_store(&settings.store_path, settings.store_passphrase.as_deref())
            .build()
            .await
            .map_err(|e| BridgeError::Config(format!("failed to build Matrix client: {e}")))?;

        let user_id = matrix_sdk::ruma::UserId::parse(settings.bot_user_id.as_str())
            .map_err(|e| BridgeError::Config(format!("matrix.bot_user_id: {e}")))?;
        let session = MatrixSession {
            meta: SessionMeta {
                user_id,
                device_id: settings.device_id.as_str().into(),
            },
            tokens: SessionTokens {
                access_token: settings.access_token.clone(),
                refresh_token: None,
            },
        };
        client
            .restore_session(session)
            .await
            .map_err(|e| sdk_err("restore Matrix session", e))?;
        info!(
            user_id = %settings.bot_user_id,
            device_id = %settings.device_id,
            store = %settings.store_path.display(),
            "Matrix session restored"
        );

        Ok(Self {
            client,
            bot_user_id: settings.bot_user_id.clone(),
        })
    }

    fn room(&self, room_id: &RoomId) -> Result<Room, BridgeError> {
        let sdk_id = sdk_room_id(room_id)?;
        self.client.get_room(&sdk_id).ok_or_else(|| BridgeError::Protocol {
            message: format!("room {room_id} is not known to this client"),
            status: Some(404),
            source: None,
        })
    }

    async fn local_state(
        &self,
        room: &Room,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, BridgeError> {
        let state = room
            .get_state_event(StateEventType::from(event_type), state_key)
            .await
            .map_err(|e| store_err("read room state", e))?;
        Ok(state.as_ref().and_then(state_content))
    }

    /// One `/sync` long-poll. The SDK decrypts what it can before returning.
    pub async fn sync_once(
        &self,
        since: Option<&str>,
        timeout: Duration,
    ) -> Result<SyncBatch, BridgeError> {
        let mut settings = SyncSettings::default().timeout(timeout);
        if let Some(token) = since {
            settings = settings.token(token);
        }
        let response = self
            .client
            .sync_once(settings)
            .await
            .map_err(|e| sdk_err("sync", e))?;
        Ok(SyncBatch::from_sdk(&response))
    }
}

#[async_trait]
impl ProtocolClient for MatrixClient {
    fn bot_user_id(&self) -> &UserId {
        &self.bot_user_id
    }

    async fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        content: Value,
        txn_id: &TransactionId,
    ) -> Result<OwnedEventId, BridgeError> {
        let room = self.room(room_id)?;
        if carries_attachment_key(&content) {
            let encrypted = self.local_state(&room, "m.room.encryption", "").await?.is_some();
            guard_attachment_key(room_id, encrypted)?;
        }
        let txn = matrix_sdk::ruma::OwnedTransactionId::from(txn_id.as_str());
        let response = room
            .send_raw(event_type, content)
            .with_transaction_id(&txn)
            .await
            .map_err(|e| sdk_err("send event", e))?;
        let event_id = core_event_id(&response.event_id)?;
        debug!(%room_id, %event_id, event_type, "event sent");
        Ok(event_id)
    }

    async fn get_event(&self, room_id: &RoomId, event_id: &EventId) -> Result<RawEvent, BridgeError> {
        let room = self.room(room_id)?;
        let event = room
            .event(&sdk_event_id(event_id)?, None)
            .await
            .map_err(|e| sdk_err("get event", e))?;
        let mut raw = raw_event(event.raw())?;
        if raw.room_id.is_none() {
            raw.room_id = Some(room_id.to_string());
        }
        Ok(raw)
    }

    async fn redact_event(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        reason: Option<&str>,
        txn_id: &TransactionId,
    ) -> Result<OwnedEventId, BridgeError> {
        let room = self.room(room_id)?;
        let txn = matrix_sdk::ruma::OwnedTransactionId::from(txn_id.as_str());
        let response = room
            .redact(&sdk_event_id(event_id)?, reason, Some(txn))
            .await
            .map_err(|e| http_err("redact event", e))?;
        core_event_id(&response.event_id)
    }

    async fn download_media(&self, source: &MediaSource) -> Result<Vec<u8>, BridgeError> {
        let request = MediaRequestParameters {
            source: sdk_media_source(source)?,
            format: MediaFormat::File,
        };
        self.client
            .media()
            .get_media_content(&request, false)
            .await
            .map_err(|e| sdk_err("download media", e))
    }

    async fn upload_media(
        &self,
        data: Vec<u8>,
        content_type: &str,
        filename: Option<&str>,
        encrypt: bool,
    ) -> Result<MediaSource, BridgeError> {
        if encrypt {
            let mut reader = Cursor::new(data);
            let file = self
                .client
                .upload_encrypted_file(&mut reader)
                .await
                .map_err(|e| sdk_err("upload encrypted media", e))?;
            return Ok(MediaSource::Encrypted(Box::new(core_encrypted_file(&file)?)));
        }

        let size = data.len();
        let response = self
            .client
            .media()
            .upload(&parse_mime(content_type), data, None)
            .await
            .map_err(|e| sdk_err("upload media", e))?;
        debug!(uri = %response.content_uri, size, filename, "media uploaded");
        Ok(MediaSource::Plain(OwnedMxcUri::from(
            response.content_uri.as_str(),
        )))
    }

    async fn joined_members(&self, room_id: &RoomId) -> Result<Vec<OwnedUserId>, BridgeError> {
        let room = self.room(room_id)?;
        let members = room
            .members(RoomMemberships::JOIN)
            .await
            .map_err(|e| sdk_err("joined members", e))?;
        members
            .iter()
            .map(|member| {
                UserId::parse(member.user_id().as_str())
                    .map_err(|e| BridgeError::protocol(format!("invalid member ID: {e}")))
            })
            .collect()
    }

    async fn join_room(&self, room_id: &RoomId) -> Result<(), BridgeError> {
        self.client
            .join_room_by_id(&sdk_room_id(room_id)?)
            .await
            .map_err(|e| sdk_err("join room", e))?;
        Ok(())
    }

    async fn leave_room(&self, room_id: &RoomId) -> Result<(), BridgeError> {
        self.room(room_id)?
            .leave()
            .await
            .map_err(|e| sdk_err("leave room", e))
    }

    async fn send_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<OwnedEventId, BridgeError> {
        let response = self
            .room(room_id)?
            .send_state_event_raw(event_type, state_key, content)
            .await
            .map_err(|e| sdk_err("send state event", e))?;
        core_event_id(&response.event_id)
    }

    async fn get_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, BridgeError> {
        let room = self.room(room_id)?;
        self.local_state(&room, event_type, state_key).await
    }

    async fn send_read_receipt(&self, room_id: &RoomId, event_id: &EventId) -> Result<(), BridgeError> {
        self.room(room_id)?
            .send_single_receipt(
                ReceiptType::Read,
                ReceiptThread::Unthreaded,
                sdk_event_id(event_id)?,
            )
            .await
            .map_err(|e| sdk_err("send read receipt", e))
    }

    /// Refetch the event so the SDK can retry decryption with any room keys
    /// that arrived since it was first seen.
    async fn decrypt(&self, room_id: &RoomId, event: &RawEvent) -> Result<RawEvent, BridgeError> {
        let event_id = event
            .event_id
            .as_deref()
            .ok_or_else(|| BridgeError::Validation("encrypted event without event_id".into()))?;
        let event_id = EventId::parse(event_id)
            .map_err(|e| BridgeError::Validation(format!("invalid event ID: {e}")))?;
        let fetched = self.get_event(room_id, &event_id).await?;
        if fetched.is_encrypted() {
            let algorithm = event
                .content
                .get("algorithm")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(BridgeError::protocol(format!(
                "no room key for {algorithm} event {event_id} in {room_id}"
            )));
        }
        Ok(fetched)
    }
}
