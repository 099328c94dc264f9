// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for deskbridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level deskbridge configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeskbridgeConfig {
    /// Matrix homeserver connection and bot identity.
    #[serde(default)]
    pub matrix: MatrixConfig,

    /// Chatwoot account and inbox.
    #[serde(default)]
    pub chatwoot: ChatwootConfig,

    /// Bridging behavior.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Room auto-provisioning for desk-initiated conversations.
    #[serde(default)]
    pub start_new_chat: StartNewChatConfig,

    /// Webhook listener.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Identity store.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry policy for remote calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Matrix homeserver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    /// Client-server API base URL, e.g. `https://matrix.example.org`.
    #[serde(default)]
    pub homeserver_url: String,

    /// Fully-qualified bot user ID, e.g. `@support:example.org`.
    #[serde(default)]
    pub bot_user_id: String,

    /// Bot access token. Ignored when `access_token_file` is set.
    #[serde(default)]
    pub access_token: Option<String>,

    /// File holding the bot access token.
    #[serde(default)]
    pub access_token_file: Option<String>,

    /// Device the access token was issued for. End-to-end encryption keys
    /// are bound to it.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Directory of the Matrix state and crypto store.
    #[serde(default = "default_matrix_store_path")]
    pub store_path: String,

    /// Passphrase encrypting the Matrix store. Ignored when
    /// `store_passphrase_file` is set.
    #[serde(default)]
    pub store_passphrase: Option<String>,

    #[serde(default)]
    pub store_passphrase_file: Option<String>,

    /// Homeservers whose users may open conversations. The bot's own
    /// homeserver is always allowed.
    #[serde(default)]
    pub allowed_homeservers: Vec<String>,

    /// Accept senders from any homeserver.
    #[serde(default)]
    pub allow_other_homeservers: bool,

    /// Long-poll timeout for `/sync`, in milliseconds.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Join rooms the bot is invited to.
    #[serde(default = "default_true")]
    pub auto_join: bool,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            homeserver_url: String::new(),
            bot_user_id: String::new(),
            access_token: None,
            access_token_file: None,
            device_id: default_device_id(),
            store_path: default_matrix_store_path(),
            store_passphrase: None,
            store_passphrase_file: None,
            allowed_homeservers: Vec::new(),
            allow_other_homeservers: false,
            sync_timeout_ms: default_sync_timeout_ms(),
            auto_join: true,
        }
    }
}

fn default_device_id() -> String {
    "DESKBRIDGE".to_string()
}

fn default_matrix_store_path() -> String {
    data_dir().join("matrix-store").display().to_string()
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("deskbridge"))
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// Chatwoot account configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatwootConfig {
    /// Installation base URL, e.g. `https://desk.example.org`.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub account_id: i64,

    /// API inbox that bridged conversations are created in.
    #[serde(default)]
    pub inbox_id: i64,

    /// Agent-bot or user API token. Ignored when `access_token_file` is set.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub access_token_file: Option<String>,
}

/// Bridging behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Only bridge rooms with fewer joined members than this. Negative disables the check.
    #[serde(default = "default_member_limit")]
    pub bridge_if_members_less_than: i64,

    /// Room-name prefix identifying canonical DM rooms. Empty disables labelling.
    #[serde(default)]
    pub canonical_dm_prefix: String,

    /// Delay before labelling a new canonical DM conversation.
    #[serde(default = "default_label_delay_secs")]
    pub canonical_dm_label_delay_secs: u64,

    /// Render agent messages from markdown to HTML.
    #[serde(default = "default_true")]
    pub render_markdown: bool,

    /// Append ` - <first name>` to agent messages.
    #[serde(default = "default_true")]
    pub sign_agent_messages: bool,

    /// Base URL for ticket links found in messages, e.g. `https://issues.example.org/browse/`.
    #[serde(default)]
    pub ticket_link_base: Option<String>,

    /// Publish the conversation-ID state event for every stored link at startup.
    #[serde(default)]
    pub conversation_state_backfill: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_if_members_less_than: default_member_limit(),
            canonical_dm_prefix: String::new(),
            canonical_dm_label_delay_secs: default_label_delay_secs(),
            render_markdown: true,
            sign_agent_messages: true,
            ticket_link_base: None,
            conversation_state_backfill: false,
        }
    }
}

fn default_member_limit() -> i64 {
    -1
}

fn default_label_delay_secs() -> u64 {
    30
}

/// Start-new-chat provisioning endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StartNewChatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint receiving `POST` with the contact; answers `{room_id, error}`.
    #[serde(default)]
    pub endpoint: String,

    /// Bearer token for the endpoint.
    #[serde(default)]
    pub token: Option<String>,
}

/// Webhook listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Identity store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    data_dir().join("deskbridge.db").display().to_string()
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Unit delay multiplied by the Fibonacci sequence between attempts.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Level for deskbridge crates (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve a secret from an inline value or a file, trimming trailing whitespace.
pub fn resolve_secret(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, std::io::Error> {
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)?;
        return Ok(Some(content.trim_end().to_string()));
    }
    Ok(inline.map(str::to_string))
}

impl MatrixConfig {
    /// Bot access token from the file or the inline value.
    pub fn resolved_access_token(&self) -> Result<Option<String>, std::io::Error> {
        resolve_secret(self.access_token.as_deref(), self.access_token_file.as_deref())
    }

    /// Store passphrase from the file or the inline value.
    pub fn resolved_store_passphrase(&self) -> Result<Option<String>, std::io::Error> {
        resolve_secret(
            self.store_passphrase.as_deref(),
            self.store_passphrase_file.as_deref(),
        )
    }

    /// Server name part of the bot user ID.
    pub fn bot_server_name(&self) -> Option<&str> {
        self.bot_user_id.split_once(':').map(|(_, server)| server)
    }
}

impl ChatwootConfig {
    pub fn resolved_access_token(&self) -> Result<Option<String>, std::io::Error> {
        resolve_secret(self.access_token.as_deref(), self.access_token_file.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DeskbridgeConfig::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.webhook.port, 8080);
        assert_eq!(config.bridge.bridge_if_members_less_than, -1);
        assert_eq!(config.bridge.canonical_dm_label_delay_secs, 30);
        assert!(config.matrix.auto_join);
        assert_eq!(config.matrix.device_id, "DESKBRIDGE");
        assert!(config.matrix.store_path.ends_with("matrix-store"));
        assert!(!config.storage.database_path.is_empty());
    }

    #[test]
    fn bot_server_name_is_split_from_user_id() {
        let matrix = MatrixConfig {
            bot_user_id: "@support:example.org".into(),
            ..MatrixConfig::default()
        };
        assert_eq!(matrix.bot_server_name(), Some("example.org"));
    }

    #[test]
    fn token_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "from-file\n").unwrap();
        let token = resolve_secret(Some("inline"), path.to_str()).unwrap();
        assert_eq!(token.as_deref(), Some("from-file"));
        assert_eq!(
            resolve_secret(Some("inline"), None).unwrap().as_deref(),
            Some("inline")
        );
    }
}
