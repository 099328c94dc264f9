// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Chatwoot application API.
//!
//! Every request is scoped to one account and authenticated with the
//! `api_access_token` header. Non-2xx answers become [`BridgeError::Desk`]
//! carrying the status code.

use std::time::Duration;

use async_trait::async_trait;
use deskbridge_core::desk::{Conversation, DeskMessage, ROOM_ID_ATTRIBUTE};
use deskbridge_core::error::BridgeError;
use deskbridge_core::traits::{AttachmentUpload, DeskClient};
use deskbridge_core::types::{
    ContactId, ConversationId, ConversationStatus, MessageDirection, MessageId, RoomId, UserId,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::payloads::{
    ContactEnvelope, ContactList, ConversationList, CreateContact, CreateConversation,
    CreateMessage, LabelList,
};

const ACCESS_TOKEN_HEADER: &str = "api_access_token";

fn transport_err(context: &str, e: reqwest::Error) -> BridgeError {
    BridgeError::Desk {
        message: format!("{context}: {e}"),
        status: e.status().map(|s| s.as_u16()),
        source: Some(Box::new(e)),
    }
}

/// Chatwoot client bound to one account and inbox.
#[derive(Debug, Clone)]
pub struct ChatwootClient {
    http: reqwest::Client,
    base: Url,
    account_id: i64,
    inbox_id: i64,
}

impl ChatwootClient {
    pub fn new(
        base_url: &str,
        account_id: i64,
        inbox_id: i64,
        access_token: &str,
    ) -> Result<Self, BridgeError> {
        let base = Url::parse(base_url)
            .map_err(|e| BridgeError::Config(format!("invalid Chatwoot URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BridgeError::Config(format!(
                "Chatwoot URL {base_url:?} cannot be used as a base"
            )));
        }

        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(access_token)
            .map_err(|e| BridgeError::Config(format!("invalid Chatwoot access token: {e}")))?;
        token.set_sensitive(true);
        headers.insert(ACCESS_TOKEN_HEADER, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BridgeError::Desk {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            base,
            account_id,
            inbox_id,
        })
    }

    pub fn inbox_id(&self) -> i64 {
        self.inbox_id
    }

    /// `{base}/api/v1/accounts/{account}/{segments...}`.
    fn account_url(&self, segments: &[&str]) -> Result<Url, BridgeError> {
        let account = self.account_id.to_string();
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| BridgeError::Internal("Chatwoot URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["api", "v1", "accounts", account.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn conversation_url(
        &self,
        id: ConversationId,
        rest: &[&str],
    ) -> Result<Url, BridgeError> {
        let id = id.to_string();
        let mut segments = vec!["conversations", id.as_str()];
        segments.extend_from_slice(rest);
        self.account_url(&segments)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<reqwest::Response, BridgeError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_err(context, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BridgeError::Desk {
            message: format!("{context}: {status}: {body}"),
            status: Some(status.as_u16()),
            source: None,
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T, BridgeError> {
        self.execute(request, context)
            .await?
            .json::<T>()
            .await
            .map_err(|e| transport_err(context, e))
    }

    async fn post_message(
        &self,
        id: ConversationId,
        content: &str,
        direction: MessageDirection,
        private: bool,
    ) -> Result<DeskMessage, BridgeError> {
        let url = self.conversation_url(id, &["messages"])?;
        let direction = direction.to_string();
        let body = CreateMessage {
            content,
            message_type: &direction,
            private,
        };
        self.json(self.http.post(url).json(&body), "send message")
            .await
    }
}

#[async_trait]
impl DeskClient for ChatwootClient {
    async fn create_contact(
        &self,
        identity: &UserId,
        display_name: &str,
    ) -> Result<ContactId, BridgeError> {
        let url = self.account_url(&["contacts"])?;
        let body = CreateContact {
            inbox_id: self.inbox_id,
            name: display_name,
            identifier: identity.as_str(),
        };
        let created: ContactEnvelope = self
            .json(self.http.post(url).json(&body), "create contact")
            .await?;
        debug!(contact_id = %created.payload.contact.id, %identity, "created desk contact");
        Ok(created.payload.contact.id)
    }

    async fn find_contact_by_identity(
        &self,
        identity: &UserId,
    ) -> Result<Option<ContactId>, BridgeError> {
        let url = self.account_url(&["contacts", "search"])?;
        let found: ContactList = self
            .json(
                self.http.get(url).query(&[("q", identity.as_str())]),
                "search contacts",
            )
            .await?;
        Ok(found
            .payload
            .into_iter()
            .find(|c| c.identifier.as_deref() == Some(identity.as_str()))
            .map(|c| c.id))
    }

    async fn create_conversation(
        &self,
        source_id: &RoomId,
        contact_id: ContactId,
        additional_attributes: Map<String, Value>,
    ) -> Result<Conversation, BridgeError> {
        let url = self.account_url(&["conversations"])?;
        let body = CreateConversation {
            source_id: source_id.as_str(),
            inbox_id: self.inbox_id,
            contact_id,
            status: "open",
            additional_attributes: &additional_attributes,
        };
        self.json(self.http.post(url).json(&body), "create conversation")
            .await
    }

    async fn find_conversation_for_source(
        &self,
        contact_id: ContactId,
        source_id: &RoomId,
    ) -> Result<Option<ConversationId>, BridgeError> {
        let contact = contact_id.to_string();
        let url = self.account_url(&["contacts", contact.as_str(), "conversations"])?;
        let list: ConversationList = self
            .json(self.http.get(url), "list contact conversations")
            .await?;
        Ok(list
            .payload
            .into_iter()
            .find(|c| {
                c.additional_attributes
                    .get(ROOM_ID_ATTRIBUTE)
                    .and_then(Value::as_str)
                    == Some(source_id.as_str())
            })
            .map(|c| c.id))
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, BridgeError> {
        let url = self.conversation_url(id, &[])?;
        self.json(self.http.get(url), "get conversation").await
    }

    async fn set_conversation_custom_attributes(
        &self,
        id: ConversationId,
        attributes: Map<String, Value>,
    ) -> Result<(), BridgeError> {
        let url = self.conversation_url(id, &["custom_attributes"])?;
        let body = json!({ "custom_attributes": attributes });
        self.execute(self.http.post(url).json(&body), "set custom attributes")
            .await?;
        Ok(())
    }

    async fn get_conversation_labels(&self, id: ConversationId) -> Result<Vec<String>, BridgeError> {
        let url = self.conversation_url(id, &["labels"])?;
        let labels: LabelList = self.json(self.http.get(url), "get labels").await?;
        Ok(labels.payload)
    }

    async fn set_conversation_labels(
        &self,
        id: ConversationId,
        labels: &[String],
    ) -> Result<(), BridgeError> {
        let url = self.conversation_url(id, &["labels"])?;
        let body = json!({ "labels": labels });
        self.execute(self.http.post(url).json(&body), "set labels")
            .await?;
        Ok(())
    }

    async fn toggle_conversation_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<(), BridgeError> {
        let url = self.conversation_url(id, &["toggle_status"])?;
        let body = json!({ "status": status });
        self.execute(self.http.post(url).json(&body), "toggle status")
            .await?;
        Ok(())
    }

    async fn send_text_message(
        &self,
        id: ConversationId,
        content: &str,
        direction: MessageDirection,
    ) -> Result<DeskMessage, BridgeError> {
        self.post_message(id, content, direction, false).await
    }

    async fn send_private_message(
        &self,
        id: ConversationId,
        content: &str,
    ) -> Result<DeskMessage, BridgeError> {
        self.post_message(id, content, MessageDirection::Outgoing, true)
            .await
    }

    async fn send_attachment_message(
        &self,
        id: ConversationId,
        upload: AttachmentUpload,
        direction: MessageDirection,
    ) -> Result<DeskMessage, BridgeError> {
        let url = self.conversation_url(id, &["messages"])?;
        let mime = if upload.mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            upload.mime_type
        };
        let file = Part::bytes(upload.data)
            .file_name(upload.filename)
            .mime_str(&mime)
            .map_err(|e| BridgeError::Validation(format!("invalid attachment type {mime:?}: {e}")))?;
        let form = Form::new()
            .text("content", "")
            .text("private", "false")
            .text("message_type", direction.to_string())
            .part("attachments[]", file);
        self.json(self.http.post(url).multipart(form), "send attachment")
            .await
    }

    async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), BridgeError> {
        let message = message_id.to_string();
        let url = self.conversation_url(conversation_id, &["messages", message.as_str()])?;
        self.execute(self.http.delete(url), "delete message").await?;
        Ok(())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, BridgeError> {
        let url = Url::parse(url)
            .map_err(|e| BridgeError::Validation(format!("invalid attachment URL {url:?}: {e}")))?;
        let response = self.execute(self.http.get(url), "download attachment").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_err("download attachment", e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ChatwootClient {
        ChatwootClient::new(base, 3, 7, "token").unwrap()
    }

    #[test]
    fn account_urls_are_scoped() {
        let c = client("https://desk.example.com");
        assert_eq!(
            c.account_url(&["contacts", "search"]).unwrap().as_str(),
            "https://desk.example.com/api/v1/accounts/3/contacts/search"
        );
    }

    #[test]
    fn trailing_slash_base_does_not_double_up() {
        let c = client("https://desk.example.com/chatwoot/");
        assert_eq!(
            c.conversation_url(ConversationId(10), &["labels"])
                .unwrap()
                .as_str(),
            "https://desk.example.com/chatwoot/api/v1/accounts/3/conversations/10/labels"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            ChatwootClient::new("not a url", 1, 1, "t"),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            ChatwootClient::new("mailto:desk@example.com", 1, 1, "t"),
            Err(BridgeError::Config(_))
        ));
    }
}
