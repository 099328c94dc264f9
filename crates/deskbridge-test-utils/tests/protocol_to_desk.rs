// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol events flowing into the desk through the full engine.

use std::time::Duration;

use deskbridge_core::BridgeError;
use deskbridge_core::desk::ROOM_ID_ATTRIBUTE;
use deskbridge_core::event::{RawEvent, RoomEvent};
use deskbridge_core::types::{
    ConversationId, ConversationStatus, MessageDirection, OwnedRoomId, OwnedUserId, RoomId, UserId,
};
use deskbridge_engine::EngineSettings;
use deskbridge_engine::background::CANONICAL_DM_LABEL;
use deskbridge_engine::lifecycle::CONVERSATION_STATE_EVENT;
use deskbridge_engine::protocol_inbound::MESSAGE_FAILURE_NOTE;
use deskbridge_test_utils::{MockDesk, TestHarness};
use serde_json::{Value, json};

fn room() -> OwnedRoomId {
    RoomId::parse("!dm:mock.test").unwrap()
}

fn alice() -> OwnedUserId {
    UserId::parse("@alice:mock.test").unwrap()
}

fn text(event_id: &str, sender: &UserId, body: &str) -> Value {
    json!({
        "type": "m.room.message",
        "event_id": event_id,
        "sender": sender.as_str(),
        "content": {"msgtype": "m.text", "body": body}
    })
}

async fn dm_harness(settings: EngineSettings) -> TestHarness {
    let h = TestHarness::builder().with_settings(settings).build().await.unwrap();
    h.dm(&room(), &alice()).await;
    h
}

fn quick_settings() -> EngineSettings {
    EngineSettings {
        canonical_dm_label_delay: Duration::from_millis(10),
        ..EngineSettings::default()
    }
}

#[tokio::test]
async fn first_message_creates_contact_conversation_and_link() {
    let h = dm_harness(quick_settings()).await;

    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();

    let contacts = h.desk.contacts().await;
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].identity, alice());
    assert_eq!(contacts[0].display_name, "@alice:mock.test");

    let conversations = h.desk.conversations().await;
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].contact_id, contacts[0].id);
    assert_eq!(
        conversations[0].additional_attributes[ROOM_ID_ATTRIBUTE],
        "!dm:mock.test"
    );
    let conversation_id = conversations[0].id;
    assert_eq!(h.store.link_room(&room()).await.unwrap(), Some(conversation_id));

    let messages = h.desk.public_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content.as_deref(), Some("hello"));
    assert_eq!(messages[0].direction, Some(MessageDirection::Incoming));

    let event_id = deskbridge_core::types::EventId::parse("$e1:mock.test").unwrap();
    assert_eq!(
        h.store.message_ids_for_event(&event_id).await.unwrap(),
        vec![messages[0].id]
    );

    let states = h.protocol.state_writes().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].event_type, CONVERSATION_STATE_EVENT);
    assert_eq!(states[0].content["conversation_id"], json!(conversation_id));
}

#[tokio::test]
async fn replayed_event_is_not_delivered_twice() {
    let h = dm_harness(quick_settings()).await;
    let event = text("$e1:mock.test", &alice(), "hello");

    h.room_event(&room(), event.clone()).await.unwrap();
    h.room_event(&room(), event).await.unwrap();

    assert_eq!(h.desk.public_messages().await.len(), 1);
    assert_eq!(h.desk.conversations().await.len(), 1);
}

#[tokio::test]
async fn concurrent_first_events_create_one_conversation() {
    let desk = MockDesk::new().with_create_conversation_delay(Duration::from_millis(20));
    let h = TestHarness::builder()
        .with_settings(quick_settings())
        .with_desk(desk)
        .build()
        .await
        .unwrap();
    let dm = room();
    h.dm(&dm, &alice()).await;

    let (a, b) = tokio::join!(
        h.room_event(&dm, text("$e1:mock.test", &alice(), "one")),
        h.room_event(&dm, text("$e2:mock.test", &alice(), "two")),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.desk.conversations().await.len(), 1);
    assert_eq!(h.desk.contacts().await.len(), 1);
    assert_eq!(h.desk.public_messages().await.len(), 2);
}

#[tokio::test]
async fn same_contact_in_two_rooms_gets_one_contact_and_two_conversations() {
    let desk = MockDesk::new().with_create_conversation_delay(Duration::from_millis(20));
    let h = TestHarness::builder()
        .with_settings(quick_settings())
        .with_desk(desk)
        .build()
        .await
        .unwrap();
    let dm = room();
    let support = RoomId::parse("!support:mock.test").unwrap();
    h.dm(&dm, &alice()).await;
    h.dm(&support, &alice()).await;

    let (a, b) = tokio::join!(
        h.room_event(&dm, text("$e1:mock.test", &alice(), "one")),
        h.room_event(&support, text("$e2:mock.test", &alice(), "two")),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.desk.contacts().await.len(), 1);
    let conversations = h.desk.conversations().await;
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].contact_id, conversations[1].contact_id);
    assert_ne!(conversations[0].source_id, conversations[1].source_id);

    let first = h.store.link_room(&room()).await.unwrap().unwrap();
    let second = h.store.link_room(&support).await.unwrap().unwrap();
    assert_ne!(first, second);
    assert_eq!(h.desk.public_messages().await.len(), 2);
}

#[tokio::test]
async fn redaction_deletes_once() {
    let h = dm_harness(quick_settings()).await;
    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();

    for redaction in ["$r1:mock.test", "$r2:mock.test"] {
        h.room_event(
            &room(),
            json!({
                "type": "m.room.redaction",
                "event_id": redaction,
                "sender": "@alice:mock.test",
                "redacts": "$e1:mock.test",
                "content": {}
            }),
        )
        .await
        .unwrap();
    }

    let deleted = h.desk.deleted().await;
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].1, h.desk.public_messages().await[0].id);
}

#[tokio::test]
async fn failed_redaction_is_retried_on_replay() {
    let h = dm_harness(quick_settings()).await;
    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();
    let redaction = json!({
        "type": "m.room.redaction",
        "event_id": "$r1:mock.test",
        "sender": "@alice:mock.test",
        "redacts": "$e1:mock.test",
        "content": {}
    });

    h.desk.fail_next("delete_message", 1, 400).await;
    let err = h.room_event(&room(), redaction.clone()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Aggregate(ref errors) if errors.len() == 1));
    assert!(h.desk.deleted().await.is_empty());

    h.room_event(&room(), redaction).await.unwrap();
    assert_eq!(h.desk.deleted().await.len(), 1);
}

#[tokio::test]
async fn agent_media_is_attached_and_redactable() {
    let h = dm_harness(quick_settings()).await;
    let bot = h.bot();
    let png_bytes = vec![7u8; 10];
    h.protocol.insert_media("mxc://mock.test/cat", png_bytes.clone()).await;

    h.room_event(
        &room(),
        json!({
            "type": "m.room.message",
            "event_id": "$img:mock.test",
            "sender": bot.as_str(),
            "content": {
                "msgtype": "m.image",
                "body": "cat.png",
                "url": "mxc://mock.test/cat",
                "info": {"mimetype": "image/png", "size": 10}
            }
        }),
    )
    .await
    .unwrap();

    let contacts = h.desk.contacts().await;
    assert_eq!(contacts[0].identity, alice());

    let messages = h.desk.public_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, Some(MessageDirection::Outgoing));
    let upload = messages[0].attachment.as_ref().unwrap();
    assert_eq!(upload.filename, "cat.png");
    assert_eq!(upload.mime_type, "image/png");
    assert_eq!(upload.data, png_bytes);

    h.room_event(
        &room(),
        json!({
            "type": "m.room.redaction",
            "event_id": "$r1:mock.test",
            "sender": bot.as_str(),
            "redacts": "$img:mock.test",
            "content": {}
        }),
    )
    .await
    .unwrap();
    assert_eq!(h.desk.deleted().await, vec![(messages[0].conversation_id, messages[0].id)]);
}

#[tokio::test]
async fn declared_size_mismatch_is_reported() {
    let h = dm_harness(quick_settings()).await;
    h.protocol.insert_media("mxc://mock.test/doc", vec![1, 2, 3]).await;

    let err = h
        .room_event(
            &room(),
            json!({
                "type": "m.room.message",
                "event_id": "$doc:mock.test",
                "sender": "@alice:mock.test",
                "content": {
                    "msgtype": "m.file",
                    "body": "report.pdf",
                    "url": "mxc://mock.test/doc",
                    "info": {"size": 99}
                }
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation(_)));

    let notes = h.desk.private_notes().await;
    assert_eq!(notes.len(), 1);
    assert!(notes[0].content.as_deref().unwrap().starts_with(MESSAGE_FAILURE_NOTE));
}

#[tokio::test]
async fn media_caption_is_sent_separately() {
    let h = dm_harness(quick_settings()).await;
    h.protocol.insert_media("mxc://mock.test/cat", vec![1; 4]).await;

    h.room_event(
        &room(),
        json!({
            "type": "m.room.message",
            "event_id": "$img:mock.test",
            "sender": "@alice:mock.test",
            "content": {
                "msgtype": "m.image",
                "body": "look at this",
                "filename": "cat.png",
                "url": "mxc://mock.test/cat"
            }
        }),
    )
    .await
    .unwrap();

    let messages = h.desk.public_messages().await;
    assert_eq!(messages.len(), 2);
    let upload = messages[0].attachment.as_ref().unwrap();
    assert_eq!(upload.filename, "cat.png");
    assert_eq!(messages[1].content.as_deref(), Some("Caption: look at this"));

    let event_id = deskbridge_core::types::EventId::parse("$img:mock.test").unwrap();
    assert_eq!(h.store.message_ids_for_event(&event_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_caption_leaves_attachment_linked_alone() {
    let h = dm_harness(quick_settings()).await;
    h.protocol.insert_media("mxc://mock.test/cat", vec![1; 4]).await;
    h.desk.fail_next("send_text_message", 1, 400).await;
    let image = json!({
        "type": "m.room.message",
        "event_id": "$img:mock.test",
        "sender": "@alice:mock.test",
        "content": {
            "msgtype": "m.image",
            "body": "look at this",
            "filename": "cat.png",
            "url": "mxc://mock.test/cat"
        }
    });

    h.room_event(&room(), image.clone()).await.unwrap();

    let messages = h.desk.public_messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].attachment.is_some());
    assert!(h.desk.private_notes().await.is_empty());
    let event_id = deskbridge_core::types::EventId::parse("$img:mock.test").unwrap();
    assert_eq!(h.store.message_ids_for_event(&event_id).await.unwrap().len(), 1);

    // The caption is best-effort: a replay sees the event as delivered.
    h.room_event(&room(), image).await.unwrap();
    assert_eq!(h.desk.public_messages().await.len(), 1);
}

#[tokio::test]
async fn edits_and_emotes_are_reshaped() {
    let h = dm_harness(quick_settings()).await;

    h.room_event(
        &room(),
        json!({
            "type": "m.room.message",
            "event_id": "$edit:mock.test",
            "sender": "@alice:mock.test",
            "content": {
                "msgtype": "m.text",
                "body": " * fixed typo",
                "m.relates_to": {"rel_type": "m.replace", "event_id": "$orig:mock.test"}
            }
        }),
    )
    .await
    .unwrap();
    h.room_event(
        &room(),
        json!({
            "type": "m.room.message",
            "event_id": "$emote:mock.test",
            "sender": "@alice:mock.test",
            "content": {"msgtype": "m.emote", "body": "waves"}
        }),
    )
    .await
    .unwrap();

    let contents: Vec<_> = h
        .desk
        .public_messages()
        .await
        .into_iter()
        .filter_map(|m| m.content)
        .collect();
    assert_eq!(contents, vec![" \\* fixed typo", " \\* alice waves"]);
}

#[tokio::test]
async fn permanent_send_failure_posts_note_and_reopens() {
    let h = dm_harness(quick_settings()).await;
    h.desk.fail_next("send_text_message", 1, 400).await;

    let err = h
        .room_event(&room(), text("$e1:mock.test", &alice(), "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    let conversation_id = h.desk.conversations().await[0].id;
    let notes = h.desk.private_notes().await;
    assert_eq!(notes.len(), 1);
    let note = notes[0].content.as_deref().unwrap();
    assert!(note.starts_with(MESSAGE_FAILURE_NOTE));
    assert!(note.ends_with("Error: desk error: scripted send_text_message failure"));
    assert_eq!(
        h.desk.status_changes().await,
        vec![(conversation_id, ConversationStatus::Open)]
    );

    // Nothing was linked, so the next delivery goes through.
    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();
    assert_eq!(h.desk.public_messages().await.len(), 1);
}

#[tokio::test]
async fn transient_send_failure_is_retried() {
    let h = dm_harness(quick_settings()).await;
    h.desk.fail_next("send_text_message", 2, 503).await;

    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();

    assert_eq!(h.desk.public_messages().await.len(), 1);
    assert!(h.desk.private_notes().await.is_empty());
}

#[tokio::test]
async fn exhausted_transient_failures_post_note() {
    let h = TestHarness::builder()
        .with_settings(quick_settings())
        .with_max_attempts(2)
        .build()
        .await
        .unwrap();
    h.dm(&room(), &alice()).await;
    h.desk.fail_next("send_text_message", 2, 503).await;

    let err = h
        .room_event(&room(), text("$e1:mock.test", &alice(), "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(h.desk.public_messages().await.is_empty());
    assert_eq!(h.desk.private_notes().await.len(), 1);
}

#[tokio::test]
async fn large_rooms_are_not_bridged() {
    let h = TestHarness::builder()
        .with_settings(EngineSettings {
            bridge_if_members_less_than: 3,
            ..quick_settings()
        })
        .build()
        .await
        .unwrap();
    let bot = h.bot();
    let bob = UserId::parse("@bob:mock.test").unwrap();
    h.protocol.set_members(&room(), &[&bot, &alice(), &bob]).await;

    let err = h
        .room_event(&room(), text("$e1:mock.test", &alice(), "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Policy(_)));
    assert!(h.desk.conversations().await.is_empty());
    assert!(h.desk.messages().await.is_empty());
}

#[tokio::test]
async fn bot_alone_in_room_leaves() {
    let h = TestHarness::new().await.unwrap();
    let bot = h.bot();
    h.protocol.set_members(&room(), &[&bot]).await;

    let err = h
        .room_event(&room(), text("$e1:mock.test", &bot, "anyone?"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Policy(_)));
    assert_eq!(h.protocol.left_rooms().await, vec![room()]);
    assert_eq!(h.protocol.member_fetches().await, 2);
    assert!(h.desk.conversations().await.is_empty());
}

#[tokio::test]
async fn reaction_is_described_with_target_text() {
    let h = dm_harness(quick_settings()).await;
    let original = text("$e1:mock.test", &alice(), "hello");
    h.protocol
        .insert_event(serde_json::from_value::<RawEvent>(original.clone()).unwrap())
        .await;
    h.room_event(&room(), original).await.unwrap();

    h.room_event(
        &room(),
        json!({
            "type": "m.reaction",
            "event_id": "$react:mock.test",
            "sender": "@alice:mock.test",
            "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": "$e1:mock.test", "key": "👍"}}
        }),
    )
    .await
    .unwrap();

    let messages = h.desk.public_messages().await;
    assert_eq!(
        messages[1].content.as_deref(),
        Some("@alice:mock.test reacted with 👍 to \"hello\"")
    );
}

#[tokio::test]
async fn reaction_in_unlinked_room_is_ignored() {
    let h = dm_harness(quick_settings()).await;
    h.room_event(
        &room(),
        json!({
            "type": "m.reaction",
            "event_id": "$react:mock.test",
            "sender": "@alice:mock.test",
            "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": "$e1:mock.test", "key": "👍"}}
        }),
    )
    .await
    .unwrap();
    assert!(h.desk.conversations().await.is_empty());
    assert!(h.desk.messages().await.is_empty());
}

#[tokio::test]
async fn undecryptable_event_posts_private_note() {
    let h = dm_harness(quick_settings()).await;
    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();

    let raw: RawEvent = serde_json::from_value(json!({
        "type": "m.room.encrypted",
        "event_id": "$enc:mock.test",
        "sender": "@alice:mock.test",
        "content": {"algorithm": "m.megolm.v1.aes-sha2"}
    }))
    .unwrap();
    let event = RoomEvent::undecryptable(&room(), &raw, "unknown session").unwrap();
    h.engine.handle_room_event(event).await.unwrap();

    let notes = h.desk.private_notes().await;
    assert_eq!(notes.len(), 1);
    let note = notes[0].content.as_deref().unwrap();
    assert!(note.contains("Failed to decrypt Matrix event ($enc:mock.test)"));
    assert!(note.ends_with("Error: unknown session"));
}

#[tokio::test]
async fn ticket_references_get_a_private_note() {
    let h = dm_harness(EngineSettings {
        ticket_link_base: Some("https://tickets.test/browse/".into()),
        ..quick_settings()
    })
    .await;

    h.room_event(&room(), text("$e1:mock.test", &alice(), "see OPS-12 and WEB-7"))
        .await
        .unwrap();
    h.settle().await;

    let notes = h.desk.private_notes().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(
        notes[0].content.as_deref(),
        Some("https://tickets.test/browse/OPS-12\n\nhttps://tickets.test/browse/WEB-7")
    );
}

#[tokio::test]
async fn canonical_dm_is_labelled_after_delay() {
    let h = dm_harness(EngineSettings {
        canonical_dm_prefix: Some("DM with ".into()),
        ..quick_settings()
    })
    .await;
    h.protocol
        .set_state(&room(), "m.room.name", "", json!({"name": "DM with Alice"}))
        .await;

    h.room_event(&room(), text("$e1:mock.test", &alice(), "hello")).await.unwrap();
    h.settle().await;

    let conversation_id = h.desk.conversations().await[0].id;
    assert_eq!(h.desk.labels(conversation_id).await, vec![CANONICAL_DM_LABEL]);
}

#[tokio::test]
async fn device_version_is_recorded() {
    let h = dm_harness(quick_settings()).await;

    h.room_event(
        &room(),
        json!({
            "type": "m.room.message",
            "event_id": "$e1:mock.test",
            "sender": "@alice:mock.test",
            "content": {
                "msgtype": "m.text",
                "body": "hello",
                "com.beeper.origin_client_type": "ios",
                "com.beeper.origin_client_version": "4.2.0"
            }
        }),
    )
    .await
    .unwrap();
    h.settle().await;

    let conversation = &h.desk.conversations().await[0];
    assert_eq!(conversation.additional_attributes["ios version"], "4.2.0");
    let custom = h.desk.custom_attributes(conversation.id).await;
    let recorded = custom["ios version"].as_str().unwrap();
    assert!(recorded.starts_with("4.2.0 (last updated at "), "{recorded}");
}

#[tokio::test]
async fn backfill_republishes_every_link() {
    let h = TestHarness::new().await.unwrap();
    let other = RoomId::parse("!other:mock.test").unwrap();
    h.store.upsert_link(&room(), ConversationId(5)).await.unwrap();
    h.store.upsert_link(&other, ConversationId(6)).await.unwrap();

    assert_eq!(h.engine.backfill_conversation_state().await.unwrap(), 2);

    let mut ids: Vec<_> = h
        .protocol
        .state_writes()
        .await
        .into_iter()
        .map(|s| s.content["conversation_id"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![5, 6]);
}
