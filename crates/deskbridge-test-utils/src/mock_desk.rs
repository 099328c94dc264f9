// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock support-desk client for deterministic testing.
//!
//! `MockDesk` implements `DeskClient` with in-memory contacts,
//! conversations, and messages, and captures every write.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deskbridge_core::BridgeError;
use deskbridge_core::desk::{Conversation, ConversationMeta, DeskMessage};
use deskbridge_core::traits::{AttachmentUpload, DeskClient};
use deskbridge_core::types::{
    ContactId, ConversationId, ConversationStatus, MessageDirection, MessageId, OwnedRoomId,
    OwnedUserId, RoomId, UserId,
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

/// A contact the engine created.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedContact {
    pub id: ContactId,
    pub identity: OwnedUserId,
    pub display_name: String,
}

/// A conversation the engine created.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedConversation {
    pub id: ConversationId,
    pub source_id: OwnedRoomId,
    pub contact_id: ContactId,
    pub additional_attributes: Map<String, Value>,
}

/// A message the engine posted.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub conversation_id: ConversationId,
    pub id: MessageId,
    pub content: Option<String>,
    /// `None` for private notes.
    pub direction: Option<MessageDirection>,
    pub attachment: Option<AttachmentUpload>,
}

impl PostedMessage {
    pub fn is_private(&self) -> bool {
        self.direction.is_none()
    }
}

#[derive(Default)]
struct State {
    counter: i64,
    contacts: Vec<CreatedContact>,
    conversations: Vec<CreatedConversation>,
    messages: Vec<PostedMessage>,
    deleted: Vec<(ConversationId, MessageId)>,
    labels: HashMap<ConversationId, Vec<String>>,
    custom_attributes: HashMap<ConversationId, Map<String, Value>>,
    status_changes: Vec<(ConversationId, ConversationStatus)>,
    attachments: HashMap<String, Vec<u8>>,
    failures: crate::failures::FailurePlan,
}

impl State {
    fn next(&mut self) -> i64 {
        self.counter += 1;
        self.counter
    }

    fn fail(&mut self, operation: &str) -> Result<(), BridgeError> {
        match self.failures.take(operation) {
            Some(status) => Err(BridgeError::Desk {
                message: format!("scripted {operation} failure"),
                status: Some(status),
                source: None,
            }),
            None => Ok(()),
        }
    }

    fn post(
        &mut self,
        conversation_id: ConversationId,
        content: Option<String>,
        direction: Option<MessageDirection>,
        attachment: Option<AttachmentUpload>,
    ) -> DeskMessage {
        let id = MessageId(self.next());
        self.messages.push(PostedMessage {
            conversation_id,
            id,
            content: content.clone(),
            direction,
            attachment,
        });
        DeskMessage {
            id,
            content,
            private: direction.is_none(),
            attachments: Vec::new(),
            sender: None,
        }
    }
}

/// A mock desk client for testing.
#[derive(Default)]
pub struct MockDesk {
    state: Mutex<State>,
    create_conversation_delay: Option<Duration>,
}

impl MockDesk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `create_conversation` for `delay` so concurrent callers overlap.
    pub fn with_create_conversation_delay(mut self, delay: Duration) -> Self {
        self.create_conversation_delay = Some(delay);
        self
    }

    /// Serve `data` for downloads of `url`.
    pub async fn insert_attachment(&self, url: &str, data: Vec<u8>) {
        self.state.lock().await.attachments.insert(url.to_string(), data);
    }

    /// Fail the next `times` calls of `operation` (the trait method name).
    pub async fn fail_next(&self, operation: &str, times: u32, status: u16) {
        self.state.lock().await.failures.arm(operation, times, status);
    }

    pub async fn contacts(&self) -> Vec<CreatedContact> {
        self.state.lock().await.contacts.clone()
    }

    pub async fn conversations(&self) -> Vec<CreatedConversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn messages(&self) -> Vec<PostedMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn public_messages(&self) -> Vec<PostedMessage> {
        self.messages().await.into_iter().filter(|m| !m.is_private()).collect()
    }

    pub async fn private_notes(&self) -> Vec<PostedMessage> {
        self.messages().await.into_iter().filter(PostedMessage::is_private).collect()
    }

    pub async fn deleted(&self) -> Vec<(ConversationId, MessageId)> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn labels(&self, id: ConversationId) -> Vec<String> {
        self.state.lock().await.labels.get(&id).cloned().unwrap_or_default()
    }

    pub async fn custom_attributes(&self, id: ConversationId) -> Map<String, Value> {
        self.state
            .lock()
            .await
            .custom_attributes
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn status_changes(&self) -> Vec<(ConversationId, ConversationStatus)> {
        self.state.lock().await.status_changes.clone()
    }
}

#[async_trait]
impl DeskClient for MockDesk {
    async fn create_contact(
        &self,
        identity: &UserId,
        display_name: &str,
    ) -> Result<ContactId, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("create_contact")?;
        let id = ContactId(state.next());
        state.contacts.push(CreatedContact {
            id,
            identity: identity.to_owned(),
            display_name: display_name.to_string(),
        });
        Ok(id)
    }

    async fn find_contact_by_identity(
        &self,
        identity: &UserId,
    ) -> Result<Option<ContactId>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("find_contact_by_identity")?;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.identity.as_str() == identity.as_str())
            .map(|c| c.id))
    }

    async fn create_conversation(
        &self,
        source_id: &RoomId,
        contact_id: ContactId,
        additional_attributes: Map<String, Value>,
    ) -> Result<Conversation, BridgeError> {
        if let Some(delay) = self.create_conversation_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        state.fail("create_conversation")?;
        let id = ConversationId(state.next());
        state.conversations.push(CreatedConversation {
            id,
            source_id: source_id.to_owned(),
            contact_id,
            additional_attributes: additional_attributes.clone(),
        });
        Ok(Conversation {
            id,
            account_id: Some(1),
            inbox_id: Some(1),
            status: Some(ConversationStatus::Open),
            messages: Vec::new(),
            meta: ConversationMeta::default(),
            custom_attributes: Map::new(),
            additional_attributes,
            labels: Vec::new(),
        })
    }

    async fn find_conversation_for_source(
        &self,
        contact_id: ContactId,
        source_id: &RoomId,
    ) -> Result<Option<ConversationId>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("find_conversation_for_source")?;
        Ok(state
            .conversations
            .iter()
            .find(|c| c.contact_id == contact_id && c.source_id.as_str() == source_id.as_str())
            .map(|c| c.id))
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("get_conversation")?;
        let created = state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| BridgeError::Desk {
                message: format!("conversation {id} not found"),
                status: Some(404),
                source: None,
            })?;
        Ok(Conversation {
            id,
            account_id: Some(1),
            inbox_id: Some(1),
            status: Some(ConversationStatus::Open),
            messages: Vec::new(),
            meta: ConversationMeta::default(),
            custom_attributes: state.custom_attributes.get(&id).cloned().unwrap_or_default(),
            additional_attributes: created.additional_attributes,
            labels: state.labels.get(&id).cloned().unwrap_or_default(),
        })
    }

    async fn set_conversation_custom_attributes(
        &self,
        id: ConversationId,
        attributes: Map<String, Value>,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("set_conversation_custom_attributes")?;
        state.custom_attributes.insert(id, attributes);
        Ok(())
    }

    async fn get_conversation_labels(&self, id: ConversationId) -> Result<Vec<String>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("get_conversation_labels")?;
        Ok(state.labels.get(&id).cloned().unwrap_or_default())
    }

    async fn set_conversation_labels(
        &self,
        id: ConversationId,
        labels: &[String],
    ) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("set_conversation_labels")?;
        state.labels.insert(id, labels.to_vec());
        Ok(())
    }

    async fn toggle_conversation_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("toggle_conversation_status")?;
        state.status_changes.push((id, status));
        Ok(())
    }

    async fn send_text_message(
        &self,
        id: ConversationId,
        content: &str,
        direction: MessageDirection,
    ) -> Result<DeskMessage, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("send_text_message")?;
        Ok(state.post(id, Some(content.to_string()), Some(direction), None))
    }

    async fn send_private_message(
        &self,
        id: ConversationId,
        content: &str,
    ) -> Result<DeskMessage, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("send_private_message")?;
        Ok(state.post(id, Some(content.to_string()), None, None))
    }

    async fn send_attachment_message(
        &self,
        id: ConversationId,
        upload: AttachmentUpload,
        direction: MessageDirection,
    ) -> Result<DeskMessage, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("send_attachment_message")?;
        Ok(state.post(id, None, Some(direction), Some(upload)))
    }

    async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("delete_message")?;
        state.deleted.push((conversation_id, message_id));
        Ok(())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, BridgeError> {
        let mut state = self.state.lock().await;
        state.fail("download_attachment")?;
        state.attachments.get(url).cloned().ok_or_else(|| BridgeError::Desk {
            message: format!("attachment {url} not found"),
            status: Some(404),
            source: None,
        })
    }
}
