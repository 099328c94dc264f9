// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response envelopes specific to the Chatwoot REST API.

use deskbridge_core::desk::{Contact, Conversation};
use deskbridge_core::types::ContactId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub(crate) struct CreateContact<'a> {
    pub inbox_id: i64,
    pub name: &'a str,
    pub identifier: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactEnvelope {
    pub payload: ContactEnvelopeInner,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactEnvelopeInner {
    pub contact: ContactRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactRef {
    pub id: ContactId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactList {
    #[serde(default)]
    pub payload: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationList {
    #[serde(default)]
    pub payload: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelList {
    #[serde(default)]
    pub payload: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateConversation<'a> {
    pub source_id: &'a str,
    pub inbox_id: i64,
    pub contact_id: ContactId,
    pub status: &'static str,
    pub additional_attributes: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessage<'a> {
    pub content: &'a str,
    pub message_type: &'a str,
    pub private: bool,
}
