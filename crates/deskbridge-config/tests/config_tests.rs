// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the deskbridge configuration system.

use std::path::Path;

use deskbridge_config::diagnostic::ConfigError;
use deskbridge_config::{
    DeskbridgeConfig, load_and_validate, load_and_validate_str, load_config_from_path,
    load_config_from_str,
};
use serial_test::serial;

const COMPLETE: &str = r#"
[matrix]
homeserver_url = "https://matrix.example.org"
bot_user_id = "@support:example.org"
access_token = "syt_bot"
allowed_homeservers = ["partner.example.com"]
sync_timeout_ms = 10000

[chatwoot]
base_url = "https://desk.example.org"
account_id = 1
inbox_id = 4
access_token = "desk-token"

[bridge]
bridge_if_members_less_than = 3
canonical_dm_prefix = "Support: "
ticket_link_base = "https://issues.example.org/browse/"

[webhook]
bind_address = "0.0.0.0"
port = 9000

[retry]
max_attempts = 3
base_delay_ms = 50
"#;

#[test]
fn complete_toml_loads_and_validates() {
    let config = load_and_validate_str(COMPLETE).expect("complete config should validate");
    assert_eq!(config.matrix.bot_user_id, "@support:example.org");
    assert_eq!(config.matrix.allowed_homeservers, vec!["partner.example.com"]);
    assert_eq!(config.matrix.sync_timeout_ms, 10_000);
    assert_eq!(config.chatwoot.inbox_id, 4);
    assert_eq!(config.bridge.bridge_if_members_less_than, 3);
    assert_eq!(config.bridge.canonical_dm_prefix, "Support: ");
    assert_eq!(config.webhook.port, 9000);
    assert_eq!(config.retry.max_attempts, 3);
    // Untouched sections keep their defaults.
    assert!(config.bridge.render_markdown);
    assert!(config.storage.wal_mode);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config.webhook.bind_address, "127.0.0.1");
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert!(config.start_new_chat.token.is_none());
}

#[test]
fn unknown_key_gets_suggestion_and_span() {
    let toml = "[bridge]\nrender_markdwn = false\n";
    let errors = load_and_validate_str(toml).expect_err("typo should be rejected");
    let Some(ConfigError::UnknownKey {
        key,
        suggestion,
        span,
        ..
    }) = errors.first()
    else {
        panic!("expected UnknownKey, got {errors:?}");
    };
    assert_eq!(key, "render_markdwn");
    assert_eq!(suggestion.as_deref(), Some("render_markdown"));
    assert!(span.is_some());
}

#[test]
fn wrong_type_is_reported_with_key_path() {
    let toml = "[webhook]\nport = \"eighty\"\n";
    let errors = load_and_validate_str(toml).expect_err("string port should be rejected");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key == "webhook.port")),
        "got {errors:?}"
    );
}

#[test]
fn missing_connection_settings_fail_validation() {
    let errors = load_and_validate_str("").expect_err("defaults lack connection settings");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
    assert!(errors.len() >= 6);
}

#[test]
#[serial]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("deskbridge.toml", COMPLETE)?;
        jail.set_env("DESKBRIDGE_WEBHOOK_PORT", "7001");
        jail.set_env("DESKBRIDGE_MATRIX_BOT_USER_ID", "@helpdesk:example.org");
        jail.set_env("DESKBRIDGE_START_NEW_CHAT_TOKEN", "bearer-123");

        let config = load_config_from_path(Path::new("deskbridge.toml"))?;
        assert_eq!(config.webhook.port, 7001);
        assert_eq!(config.matrix.bot_user_id, "@helpdesk:example.org");
        assert_eq!(config.start_new_chat.token.as_deref(), Some("bearer-123"));
        assert_eq!(config.chatwoot.inbox_id, 4);
        Ok(())
    });
}

#[test]
#[serial]
fn hierarchy_reads_local_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("deskbridge.toml", COMPLETE)?;
        let config = load_and_validate(None).map_err(|errors| format!("{errors:?}"))?;
        assert_eq!(config.chatwoot.account_id, 1);
        Ok(())
    });
}

#[test]
fn explicit_missing_file_is_an_error() {
    let result = load_config_from_path(Path::new("/nonexistent/deskbridge.toml"));
    assert!(result.is_err());
}

#[test]
fn defaults_serialize_back_to_toml() {
    let rendered = toml::to_string(&DeskbridgeConfig::default()).expect("defaults serialize");
    assert!(rendered.contains("[retry]"));
    assert!(rendered.contains("max_attempts = 5"));
}

#[test]
#[serial]
fn shipped_example_config_validates() {
    let example = include_str!("../../../deskbridge.example.toml");
    let config = load_and_validate_str(example).unwrap();
    assert_eq!(config.chatwoot.inbox_id, 3);
    assert_eq!(config.bridge.canonical_dm_prefix, "Support: ");
    assert!(config.matrix.access_token.is_none());
    assert_eq!(
        config.matrix.access_token_file.as_deref(),
        Some("/run/secrets/matrix_token")
    );
    assert_eq!(config.matrix.store_path, "/var/lib/deskbridge/matrix-store");
}
