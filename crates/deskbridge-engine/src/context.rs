// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state handed to every translator call.

use std::sync::Arc;
use std::time::Duration;

use deskbridge_config::model::BridgeConfig;
use deskbridge_core::traits::{DeskClient, ProtocolClient, RoomProvisioner};
use deskbridge_resilience::RetryPolicy;
use deskbridge_storage::IdentityStore;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::locks::LockRegistry;

/// Engine behaviour knobs, taken from the `[bridge]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Rooms with this many joined members or more are not bridged. Negative disables.
    pub bridge_if_members_less_than: i64,
    /// Room-name prefix marking canonical DMs.
    pub canonical_dm_prefix: Option<String>,
    pub canonical_dm_label_delay: Duration,
    pub render_markdown: bool,
    pub sign_agent_messages: bool,
    pub ticket_link_base: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            bridge_if_members_less_than: config.bridge_if_members_less_than,
            canonical_dm_prefix: Some(config.canonical_dm_prefix.clone())
                .filter(|p| !p.is_empty()),
            canonical_dm_label_delay: Duration::from_secs(config.canonical_dm_label_delay_secs),
            render_markdown: config.render_markdown,
            sign_agent_messages: config.sign_agent_messages,
            ticket_link_base: config.ticket_link_base.clone().filter(|b| !b.is_empty()),
        }
    }

    /// Whether a room with `member_count` joined members is too large to bridge.
    pub fn rejects_member_count(&self, member_count: usize) -> bool {
        self.bridge_if_members_less_than >= 0
            && i64::try_from(member_count).unwrap_or(i64::MAX) >= self.bridge_if_members_less_than
    }
}

/// Collaborators, store, and settings for one running bridge.
pub struct BridgeContext {
    pub protocol: Arc<dyn ProtocolClient>,
    pub desk: Arc<dyn DeskClient>,
    /// Present when start-new-chat provisioning is enabled.
    pub provisioner: Option<Arc<dyn RoomProvisioner>>,
    pub store: IdentityStore,
    pub retry: RetryPolicy,
    pub settings: EngineSettings,
    pub locks: LockRegistry,
    /// Serializes conversation and room creation across the process.
    pub(crate) creation_lock: Mutex<()>,
    /// Detached best-effort work, drained at shutdown.
    pub tasks: TaskTracker,
}

impl BridgeContext {
    pub fn new(
        protocol: Arc<dyn ProtocolClient>,
        desk: Arc<dyn DeskClient>,
        provisioner: Option<Arc<dyn RoomProvisioner>>,
        store: IdentityStore,
        retry: RetryPolicy,
        settings: EngineSettings,
    ) -> Self {
        Self {
            protocol,
            desk,
            provisioner,
            store,
            retry,
            settings,
            locks: LockRegistry::new(),
            creation_lock: Mutex::new(()),
            tasks: TaskTracker::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_limit_is_exclusive_and_negative_disables() {
        let mut settings = EngineSettings {
            bridge_if_members_less_than: 3,
            ..EngineSettings::default()
        };
        assert!(!settings.rejects_member_count(2));
        assert!(settings.rejects_member_count(3));
        settings.bridge_if_members_less_than = -1;
        assert!(!settings.rejects_member_count(500));
    }

    #[test]
    fn empty_strings_disable_optional_features() {
        let settings = EngineSettings::from_config(&BridgeConfig {
            ticket_link_base: Some(String::new()),
            ..BridgeConfig::default()
        });
        assert_eq!(settings.canonical_dm_prefix, None);
        assert_eq!(settings.ticket_link_base, None);
        assert_eq!(settings.canonical_dm_label_delay, Duration::from_secs(30));
    }
}
