// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the constraints serde attributes cannot express: required
//! connection settings, identifier shapes, and numeric ranges.

use crate::diagnostic::ConfigError;
use crate::model::DeskbridgeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &DeskbridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let matrix = &config.matrix;
    if !is_http_url(matrix.homeserver_url.trim()) {
        fail(format!(
            "matrix.homeserver_url must be an http(s) URL, got `{}`",
            matrix.homeserver_url
        ));
    }
    if deskbridge_core::types::UserId::parse(&matrix.bot_user_id).is_err() {
        fail(format!(
            "matrix.bot_user_id `{}` is not a valid user ID like `@support:example.org`",
            matrix.bot_user_id
        ));
    }
    if matrix.access_token.is_none() && matrix.access_token_file.is_none() {
        fail("matrix.access_token or matrix.access_token_file must be set".to_string());
    }
    if matrix.device_id.trim().is_empty() {
        fail("matrix.device_id must not be empty".to_string());
    }
    if matrix.store_path.trim().is_empty() {
        fail("matrix.store_path must not be empty".to_string());
    }

    let chatwoot = &config.chatwoot;
    if !is_http_url(chatwoot.base_url.trim()) {
        fail(format!(
            "chatwoot.base_url must be an http(s) URL, got `{}`",
            chatwoot.base_url
        ));
    }
    if chatwoot.account_id <= 0 {
        fail(format!(
            "chatwoot.account_id must be positive, got {}",
            chatwoot.account_id
        ));
    }
    if chatwoot.inbox_id <= 0 {
        fail(format!(
            "chatwoot.inbox_id must be positive, got {}",
            chatwoot.inbox_id
        ));
    }
    if chatwoot.access_token.is_none() && chatwoot.access_token_file.is_none() {
        fail("chatwoot.access_token or chatwoot.access_token_file must be set".to_string());
    }

    if config.start_new_chat.enabled && !is_http_url(config.start_new_chat.endpoint.trim()) {
        fail("start_new_chat.endpoint must be an http(s) URL when enabled".to_string());
    }

    if let Some(base) = &config.bridge.ticket_link_base
        && !is_http_url(base)
    {
        fail(format!("bridge.ticket_link_base `{base}` is not an http(s) URL"));
    }

    if config.webhook.bind_address.trim().parse::<std::net::IpAddr>().is_err() {
        fail(format!(
            "webhook.bind_address `{}` is not a valid IP address",
            config.webhook.bind_address
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.retry.max_attempts == 0 {
        fail("retry.max_attempts must be at least 1".to_string());
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        fail(format!(
            "logging.level `{}` must be one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DeskbridgeConfig {
        let mut config = DeskbridgeConfig::default();
        config.matrix.homeserver_url = "https://matrix.example.org".into();
        config.matrix.bot_user_id = "@support:example.org".into();
        config.matrix.access_token = Some("syt_token".into());
        config.chatwoot.base_url = "https://desk.example.org".into();
        config.chatwoot.account_id = 1;
        config.chatwoot.inbox_id = 2;
        config.chatwoot.access_token = Some("desk_token".into());
        config
    }

    fn messages(config: &DeskbridgeConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn complete_config_validates() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn default_config_reports_every_missing_connection_setting() {
        let errors = messages(&DeskbridgeConfig::default());
        for needle in [
            "homeserver_url",
            "bot_user_id",
            "matrix.access_token",
            "base_url",
            "account_id",
            "inbox_id",
        ] {
            assert!(
                errors.iter().any(|e| e.contains(needle)),
                "missing {needle} in {errors:?}"
            );
        }
    }

    #[test]
    fn zero_attempts_and_bad_level_fail() {
        let mut config = valid();
        config.retry.max_attempts = 0;
        config.logging.level = "verbose".into();
        let errors = messages(&config);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn matrix_device_and_store_are_required() {
        let mut config = valid();
        config.matrix.device_id = " ".into();
        config.matrix.store_path = String::new();
        let errors = messages(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("matrix.device_id"));
        assert!(errors[1].contains("matrix.store_path"));
    }

    #[test]
    fn enabled_provisioner_needs_endpoint() {
        let mut config = valid();
        config.start_new_chat.enabled = true;
        let errors = messages(&config);
        assert!(errors[0].contains("start_new_chat.endpoint"));
    }
}
