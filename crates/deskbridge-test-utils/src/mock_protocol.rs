// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat-protocol client for deterministic testing.
//!
//! `MockProtocol` implements `ProtocolClient` over in-memory rooms. Sent
//! events become fetchable, redactions mark them redacted, and every call
//! that changes something is captured for assertions. Sends and redactions
//! are deduplicated by transaction ID the way a homeserver does, and content
//! carrying an attachment key is refused in rooms without encryption state.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use deskbridge_core::BridgeError;
use deskbridge_core::event::{
    EncryptedFile, JsonWebKey, MediaSource, RawEvent, carries_attachment_key,
};
use deskbridge_core::traits::ProtocolClient;
use deskbridge_core::types::{
    EventId, OwnedEventId, OwnedMxcUri, OwnedRoomId, OwnedTransactionId, OwnedUserId, RoomId,
    TransactionId, UserId,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// An event the engine sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEvent {
    pub room_id: OwnedRoomId,
    pub event_id: OwnedEventId,
    pub event_type: String,
    pub content: Value,
}

/// A blob the engine uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub uri: OwnedMxcUri,
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
    pub encrypted: bool,
}

/// A state event the engine wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct SentState {
    pub room_id: OwnedRoomId,
    pub event_type: String,
    pub state_key: String,
    pub content: Value,
}

#[derive(Default)]
struct State {
    counter: u64,
    members: HashMap<OwnedRoomId, Vec<OwnedUserId>>,
    events: HashMap<OwnedEventId, RawEvent>,
    room_state: HashMap<(OwnedRoomId, String, String), Value>,
    media: HashMap<String, Vec<u8>>,
    sent: Vec<SentEvent>,
    state_writes: Vec<SentState>,
    redactions: Vec<(OwnedRoomId, OwnedEventId)>,
    uploads: Vec<Upload>,
    receipts: Vec<(OwnedRoomId, OwnedEventId)>,
    left: Vec<OwnedRoomId>,
    member_fetches: u32,
    transactions: HashMap<(OwnedRoomId, OwnedTransactionId), OwnedEventId>,
    failures: crate::failures::FailurePlan,
}

impl State {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn fail(&mut self, operation: &str) -> Result<(), BridgeError> {
        match self.failures.take(operation) {
            Some(status) => Err(BridgeError::Protocol {
                message: format!("scripted {operation} failure"),
                status: Some(status),
                source: None,
            }),
            None => Ok(()),
        }
    }

    /// Error for an operation that took effect but whose response was lost.
    fn lose(&mut self, operation: &str) -> Result<(), BridgeError> {
        match self.failures.take_lost(operation) {
            Some(status) => Err(BridgeError::Protocol {
                message: format!("scripted {operation} response loss"),
                status: Some(status),
                source: None,
            }),
            None => Ok(()),
        }
    }

    fn replayed(&self, room_id: &RoomId, txn_id: &TransactionId) -> Option<OwnedEventId> {
        self.transactions
            .get(&(room_id.to_owned(), txn_id.to_owned()))
            .cloned()
    }

    fn is_encrypted(&self, room_id: &RoomId) -> bool {
        self.room_state.contains_key(&(
            room_id.to_owned(),
            "m.room.encryption".to_string(),
            String::new(),
        ))
    }
}

fn not_found(what: impl std::fmt::Display) -> BridgeError {
    BridgeError::Protocol {
        message: format!("{what} not found"),
        status: Some(404),
        source: None,
    }
}

/// A mock protocol client for testing.
pub struct MockProtocol {
    bot: OwnedUserId,
    state: Mutex<State>,
}

impl MockProtocol {
    pub fn new(bot: OwnedUserId) -> Self {
        Self {
            bot,
            state: Mutex::new(State::default()),
        }
    }

    /// Set the joined members the homeserver reports for `room_id`.
    pub async fn set_members(&self, room_id: &RoomId, members: &[&UserId]) {
        self.state
            .lock()
            .await
            .members
            .insert(room_id.to_owned(), members.iter().map(|m| (*m).to_owned()).collect());
    }

    /// Make `event` fetchable by ID.
    pub async fn insert_event(&self, event: RawEvent) {
        if let Some(Ok(id)) = event.event_id.as_deref().map(|id| EventId::parse(id)) {
            self.state.lock().await.events.insert(id, event);
        }
    }

    pub async fn insert_media(&self, uri: &str, data: Vec<u8>) {
        self.state.lock().await.media.insert(uri.to_string(), data);
    }

    pub async fn set_state(&self, room_id: &RoomId, event_type: &str, state_key: &str, content: Value) {
        self.state.lock().await.room_state.insert(
            (room_id.to_owned(), event_type.to_string(), state_key.to_string()),
            content,
        );
    }

    /// Fail the next `times` calls of `operation` (the trait method name).
    pub async fn fail_next(&self, operation: &str, times: u32, status: u16) {
        self.state.lock().await.failures.arm(operation, times, status);
    }

    /// Apply the next `times` calls of `operation` but answer them with
    /// `status`, as when a response is lost after the server committed.
    pub async fn lose_next_response(&self, operation: &str, times: u32, status: u16) {
        self.state.lock().await.failures.arm_lost(operation, times, status);
    }

    pub async fn sent_events(&self) -> Vec<SentEvent> {
        self.state.lock().await.sent.clone()
    }

    pub async fn state_writes(&self) -> Vec<SentState> {
        self.state.lock().await.state_writes.clone()
    }

    pub async fn redactions(&self) -> Vec<(OwnedRoomId, OwnedEventId)> {
        self.state.lock().await.redactions.clone()
    }

    pub async fn uploads(&self) -> Vec<Upload> {
        self.state.lock().await.uploads.clone()
    }

    pub async fn receipts(&self) -> Vec<(OwnedRoomId, OwnedEventId)> {
        self.state.lock().await.receipts.clone()
    }

    pub async fn left_rooms(&self) -> Vec<OwnedRoomId> {
        self.state.lock().await.left.clone()
    }

    pub async fn member_fetches(&self) -> u32 {
        self.state.lock().await.member_fetches
    }
}

#[async_trait]
impl ProtocolClient for MockProtocol {
    fn bot_user_id(&self) -> &UserId {
        &self.bot
    }

    async fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        content: Value,
        txn_id: &TransactionId,
    ) -> Result<OwnedEventId, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("send_event")?;
        if let Some(event_id) = state.replayed(room_id, txn_id) {
            return Ok(event_id);
        }
        if carries_attachment_key(&content) && !state.is_encrypted(room_id) {
            return Err(BridgeError::Policy(format!(
                "refusing to send an attachment key into unencrypted room {room_id}"
            )));
        }
        let n = state.next();
        let event_id = EventId::parse(format!("$sent{n}:mock.test"))
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        state.events.insert(
            event_id.clone(),
            RawEvent {
                event_type: event_type.to_string(),
                event_id: Some(event_id.to_string()),
                sender: Some(self.bot.to_string()),
                room_id: Some(room_id.to_string()),
                content: content.clone(),
                state_key: None,
                redacts: None,
                origin_server_ts: None,
                unsigned: None,
            },
        );
        state.sent.push(SentEvent {
            room_id: room_id.to_owned(),
            event_id: event_id.clone(),
            event_type: event_type.to_string(),
            content,
        });
        state
            .transactions
            .insert((room_id.to_owned(), txn_id.to_owned()), event_id.clone());
        state.lose("send_event")?;
        Ok(event_id)
    }

    async fn get_event(&self, _room_id: &RoomId, event_id: &EventId) -> Result<RawEvent, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("get_event")?;
        state
            .events
            .get(event_id)
            .cloned()
            .ok_or_else(|| not_found(format!("event {event_id}")))
    }

    async fn redact_event(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        _reason: Option<&str>,
        txn_id: &TransactionId,
    ) -> Result<OwnedEventId, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("redact_event")?;
        if let Some(redaction_id) = state.replayed(room_id, txn_id) {
            return Ok(redaction_id);
        }
        let n = state.next();
        let redaction_id = EventId::parse(format!("$redaction{n}:mock.test"))
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        if let Some(event) = state.events.get_mut(event_id) {
            event.unsigned = Some(json!({ "redacted_because": { "event_id": redaction_id.as_str() } }));
        }
        state.redactions.push((room_id.to_owned(), event_id.to_owned()));
        state
            .transactions
            .insert((room_id.to_owned(), txn_id.to_owned()), redaction_id.clone());
        state.lose("redact_event")?;
        Ok(redaction_id)
    }

    async fn download_media(&self, source: &MediaSource) -> Result<Vec<u8>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("download_media")?;
        let uri = source.uri();
        state
            .media
            .get(uri.as_str())
            .cloned()
            .ok_or_else(|| not_found(format!("media {uri}")))
    }

    async fn upload_media(
        &self,
        data: Vec<u8>,
        content_type: &str,
        filename: Option<&str>,
        encrypt: bool,
    ) -> Result<MediaSource, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("upload_media")?;
        let n = state.next();
        let uri = OwnedMxcUri::from(format!("mxc://mock.test/upload{n}"));
        state.media.insert(uri.to_string(), data.clone());
        state.uploads.push(Upload {
            uri: uri.clone(),
            data,
            content_type: content_type.to_string(),
            filename: filename.map(str::to_string),
            encrypted: encrypt,
        });
        if !encrypt {
            return Ok(MediaSource::Plain(uri));
        }
        Ok(MediaSource::Encrypted(Box::new(EncryptedFile {
            url: uri,
            key: JsonWebKey {
                kty: "oct".into(),
                key_ops: vec!["encrypt".into(), "decrypt".into()],
                alg: "A256CTR".into(),
                k: format!("mock-key-{n}"),
                ext: true,
            },
            iv: "AAAAAAAAAAAAAAAAAAAAAA".into(),
            hashes: BTreeMap::from([("sha256".to_string(), format!("mock-hash-{n}"))]),
            v: "v2".into(),
        })))
    }

    async fn joined_members(&self, room_id: &RoomId) -> Result<Vec<OwnedUserId>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("joined_members")?;
        state.member_fetches += 1;
        Ok(state.members.get(room_id).cloned().unwrap_or_default())
    }

    async fn join_room(&self, room_id: &RoomId) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("join_room")?;
        let bot = self.bot.clone();
        state.members.entry(room_id.to_owned()).or_default().push(bot);
        Ok(())
    }

    async fn leave_room(&self, room_id: &RoomId) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("leave_room")?;
        state.left.push(room_id.to_owned());
        Ok(())
    }

    async fn send_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<OwnedEventId, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("send_state_event")?;
        let n = state.next();
        state.room_state.insert(
            (room_id.to_owned(), event_type.to_string(), state_key.to_string()),
            content.clone(),
        );
        state.state_writes.push(SentState {
            room_id: room_id.to_owned(),
            event_type: event_type.to_string(),
            state_key: state_key.to_string(),
            content,
        });
        EventId::parse(format!("$state{n}:mock.test")).map_err(|e| BridgeError::Internal(e.to_string()))
    }

    async fn get_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("get_state_event")?;
        Ok(state
            .room_state
            .get(&(room_id.to_owned(), event_type.to_string(), state_key.to_string()))
            .cloned())
    }

    async fn send_read_receipt(&self, room_id: &RoomId, event_id: &EventId) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("send_read_receipt")?;
        state.receipts.push((room_id.to_owned(), event_id.to_owned()));
        Ok(())
    }

    async fn decrypt(&self, _room_id: &RoomId, event: &RawEvent) -> Result<RawEvent, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("decrypt")?;
        let Some(plaintext) = event.content.get("plaintext").cloned() else {
            return Err(BridgeError::protocol("no session for encrypted event"));
        };
        let mut decrypted = event.clone();
        decrypted.event_type = plaintext
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("m.room.message")
            .to_string();
        decrypted.content = plaintext.get("content").cloned().unwrap_or_default();
        Ok(decrypted)
    }
}
