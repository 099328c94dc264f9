// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatwoot client and start-new-chat provisioner against a wiremock desk.

use deskbridge_chatwoot::{ChatwootClient, StartNewChatProvisioner};
use deskbridge_core::desk::Contact;
use deskbridge_core::traits::{AttachmentUpload, DeskClient, RoomProvisioner};
use deskbridge_core::types::{
    ContactId, ConversationId, ConversationStatus, MessageDirection, MessageId, RoomId, UserId,
};
use deskbridge_core::BridgeError;
use serde_json::{Map, json};
use wiremock::matchers::{
    body_json, body_string_contains, header, header_regex, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ChatwootClient {
    ChatwootClient::new(&server.uri(), 3, 7, "cw_secret").unwrap()
}

fn alice() -> deskbridge_core::types::OwnedUserId {
    UserId::parse("@alice:example.org").unwrap()
}

fn room() -> deskbridge_core::types::OwnedRoomId {
    RoomId::parse("!dm:example.org").unwrap()
}

#[tokio::test]
async fn create_contact_posts_identity_into_inbox() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/contacts"))
        .and(header("api_access_token", "cw_secret"))
        .and(body_json(json!({
            "inbox_id": 7,
            "name": "Alice",
            "identifier": "@alice:example.org"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"payload": {"contact": {"id": 42, "name": "Alice"}}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server)
        .create_contact(&alice(), "Alice")
        .await
        .unwrap();
    assert_eq!(id, ContactId(42));
}

#[tokio::test]
async fn contact_search_requires_exact_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/3/contacts/search"))
        .and(query_param("q", "@alice:example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": [
                {"id": 1, "identifier": "@alice:example.org.evil"},
                {"id": 2, "identifier": "@alice:example.org"}
            ]
        })))
        .mount(&server)
        .await;

    let c = client(&server);
    assert_eq!(
        c.find_contact_by_identity(&alice()).await.unwrap(),
        Some(ContactId(2))
    );

    let bob = UserId::parse("@bob:example.org").unwrap();
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/3/contacts/search"))
        .and(query_param("q", "@bob:example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": []})))
        .mount(&server)
        .await;
    assert_eq!(c.find_contact_by_identity(&bob).await.unwrap(), None);
}

#[tokio::test]
async fn create_conversation_opens_it_with_source_attributes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations"))
        .and(body_json(json!({
            "source_id": "!dm:example.org",
            "inbox_id": 7,
            "contact_id": 42,
            "status": "open",
            "additional_attributes": {"matrix_room_id": "!dm:example.org"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 99, "status": "open"})),
        )
        .mount(&server)
        .await;

    let mut attrs = Map::new();
    attrs.insert("matrix_room_id".into(), json!("!dm:example.org"));
    let conversation = client(&server)
        .create_conversation(&room(), ContactId(42), attrs)
        .await
        .unwrap();
    assert_eq!(conversation.id, ConversationId(99));
    assert_eq!(conversation.status, Some(ConversationStatus::Open));
}

#[tokio::test]
async fn existing_conversation_is_found_by_room_attribute() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/3/contacts/42/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": [
                {"id": 10, "additional_attributes": {"matrix_room_id": "!other:example.org"}},
                {"id": 11, "additional_attributes": null},
                {"id": 12, "additional_attributes": {"matrix_room_id": "!dm:example.org"}}
            ]
        })))
        .mount(&server)
        .await;

    let found = client(&server)
        .find_conversation_for_source(ContactId(42), &room())
        .await
        .unwrap();
    assert_eq!(found, Some(ConversationId(12)));
}

#[tokio::test]
async fn messages_carry_direction_and_privacy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations/5/messages"))
        .and(body_json(json!({"content": "hi", "message_type": "incoming", "private": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 100, "content": "hi"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations/5/messages"))
        .and(body_json(json!({"content": "note", "message_type": "outgoing", "private": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 101, "content": "note", "private": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server);
    let sent = c
        .send_text_message(ConversationId(5), "hi", MessageDirection::Incoming)
        .await
        .unwrap();
    assert_eq!(sent.id, MessageId(100));
    let note = c.send_private_message(ConversationId(5), "note").await.unwrap();
    assert!(note.private);
}

#[tokio::test]
async fn attachments_are_sent_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations/5/messages"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("attachments[]"))
        .and(body_string_contains("cat.png"))
        .and(body_string_contains("image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 102,
            "attachments": [{"id": 8, "data_url": "https://desk/cat.png"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sent = client(&server)
        .send_attachment_message(
            ConversationId(5),
            AttachmentUpload {
                filename: "cat.png".into(),
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            },
            MessageDirection::Incoming,
        )
        .await
        .unwrap();
    assert_eq!(sent.attachments.len(), 1);
}

#[tokio::test]
async fn labels_status_and_attributes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/3/conversations/5/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": ["vip"]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations/5/labels"))
        .and(body_json(json!({"labels": ["vip", "canonical-dm"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations/5/toggle_status"))
        .and(body_json(json!({"status": "open"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/accounts/3/conversations/5/custom_attributes"))
        .and(body_json(json!({"custom_attributes": {"device": "Element 1.11"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server);
    let mut labels = c.get_conversation_labels(ConversationId(5)).await.unwrap();
    assert_eq!(labels, vec!["vip".to_string()]);
    labels.push("canonical-dm".into());
    c.set_conversation_labels(ConversationId(5), &labels)
        .await
        .unwrap();
    c.toggle_conversation_status(ConversationId(5), ConversationStatus::Open)
        .await
        .unwrap();
    let mut attrs = Map::new();
    attrs.insert("device".into(), json!("Element 1.11"));
    c.set_conversation_custom_attributes(ConversationId(5), attrs)
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_reports_not_found_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/accounts/3/conversations/5/messages/77"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_message(ConversationId(5), MessageId(77))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Desk { status: Some(404), .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn download_sends_token_and_returns_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rails/active_storage/cat.png"))
        .and(header("api_access_token", "cw_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8, 8, 7]))
        .mount(&server)
        .await;

    let url = format!("{}/rails/active_storage/cat.png", server.uri());
    let bytes = client(&server).download_attachment(&url).await.unwrap();
    assert_eq!(bytes, vec![9, 8, 7]);
}

fn contact() -> Contact {
    Contact {
        id: ContactId(42),
        name: Some("Alice".into()),
        email: None,
        phone_number: Some("+15550100".into()),
        identifier: None,
    }
}

#[tokio::test]
async fn start_new_chat_returns_room() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/snc"))
        .and(header("authorization", "Bearer snc_token"))
        .and(body_string_contains("+15550100"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"room_id": "!new:example.org"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provisioner =
        StartNewChatProvisioner::new(&format!("{}/snc", server.uri()), "snc_token").unwrap();
    let room = provisioner.provision_room(&contact()).await.unwrap();
    assert_eq!(room.as_str(), "!new:example.org");
}

#[tokio::test]
async fn start_new_chat_failures_surface_endpoint_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/snc"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "no such user"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let failing =
        StartNewChatProvisioner::new(&format!("{}/snc", server.uri()), "t").unwrap();
    let err = failing.provision_room(&contact()).await.unwrap_err();
    assert_eq!(err.to_string(), "desk error: failed to create new chat: no such user");

    let empty = StartNewChatProvisioner::new(&format!("{}/empty", server.uri()), "t").unwrap();
    let err = empty.provision_room(&contact()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Validation(_)));
}
