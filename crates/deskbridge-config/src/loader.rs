// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./deskbridge.toml` > `~/.config/deskbridge/deskbridge.toml`
//! > `/etc/deskbridge/deskbridge.toml` with environment variable overrides via
//! the `DESKBRIDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::DeskbridgeConfig;

/// System-wide config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/deskbridge/deskbridge.toml";
/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "deskbridge.toml";

/// Section names, longest first so `start_new_chat_` wins over shorter prefixes.
const SECTIONS: &[&str] = &[
    "start_new_chat",
    "chatwoot",
    "logging",
    "storage",
    "webhook",
    "matrix",
    "bridge",
    "retry",
];

/// User config path under the XDG config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deskbridge").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/deskbridge/deskbridge.toml`
/// 3. `~/.config/deskbridge/deskbridge.toml`
/// 4. `./deskbridge.toml`
/// 5. `DESKBRIDGE_*` environment variables
pub fn load_config() -> Result<DeskbridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DeskbridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DeskbridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DeskbridgeConfig, figment::Error> {
    debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(DeskbridgeConfig::default()))
        .merge(Toml::file_exact(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DeskbridgeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Map a prefix-stripped, lowercased env key onto its dotted config path.
///
/// Uses explicit section prefixes instead of `Env::split("_")` because keys
/// themselves contain underscores: `DESKBRIDGE_MATRIX_BOT_USER_ID` must map
/// to `matrix.bot_user_id`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

pub(crate) fn env_provider() -> Env {
    Env::prefixed("DESKBRIDGE_").map(|key| map_env_key(key.as_str()).into())
}
