// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `check-config` output.

use deskbridge_config::DeskbridgeConfig;

const REDACTED: &str = "[REDACTED]";

fn redact(secret: &mut Option<String>) {
    if secret.is_some() {
        *secret = Some(REDACTED.to_string());
    }
}

/// Render the effective configuration as TOML with inline secrets masked.
pub fn render_config(config: &DeskbridgeConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    redact(&mut shown.matrix.access_token);
    redact(&mut shown.matrix.store_passphrase);
    redact(&mut shown.chatwoot.access_token);
    redact(&mut shown.start_new_chat.token);
    toml::to_string_pretty(&shown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_tokens_are_masked() {
        let mut config = DeskbridgeConfig::default();
        config.matrix.access_token = Some("syt_secret".into());
        config.matrix.store_passphrase = Some("store_secret".into());
        config.chatwoot.access_token = Some("cw_secret".into());
        config.chatwoot.access_token_file = Some("/run/secrets/chatwoot".into());

        let rendered = render_config(&config).unwrap();

        assert!(!rendered.contains("syt_secret"));
        assert!(!rendered.contains("cw_secret"));
        assert!(!rendered.contains("store_secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("/run/secrets/chatwoot"));
    }

    #[test]
    fn rendered_config_lists_every_section() {
        let rendered = render_config(&DeskbridgeConfig::default()).unwrap();
        for section in [
            "[matrix]",
            "[chatwoot]",
            "[bridge]",
            "[webhook]",
            "[storage]",
            "[retry]",
            "[logging]",
        ] {
            assert!(rendered.contains(section), "missing {section}");
        }
    }
}
