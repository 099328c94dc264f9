// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text shaping between the two sides: edit markers, emotes, agent
//! signatures, markdown rendering, ticket references, and contact names.

use std::sync::LazyLock;

use deskbridge_core::types::UserId;
use regex::Regex;

/// Ticket references such as `OPS-1234`.
static TICKET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{1,5}-\d+").unwrap());

/// Localpart prefixes used by bridged-network puppets, with the network's name.
const PUPPET_PREFIXES: &[(&str, &str)] = &[
    ("whatsapp_", "WhatsApp"),
    ("signal_", "Signal"),
    ("telegram_", "Telegram"),
    ("discord_", "Discord"),
    ("instagram_", "Instagram"),
    ("facebook_", "Facebook"),
    ("meta_", "Messenger"),
    ("imessage_", "iMessage"),
    ("gmessages_", "Google Messages"),
    ("linkedin_", "LinkedIn"),
    ("twitter_", "Twitter"),
    ("slack_", "Slack"),
    ("googlechat_", "Google Chat"),
];

/// Networks whose puppet localparts are phone numbers.
const PHONE_NETWORKS: &[&str] = &["WhatsApp", "Signal", "iMessage", "Google Messages"];

/// Escape the leading ` * ` of an edit so the desk does not render a bullet.
pub fn normalize_edit(body: &str) -> String {
    match body.strip_prefix(" * ") {
        Some(rest) => format!(" \\* {rest}"),
        None => body.to_string(),
    }
}

/// Render an emote as ` \* <localpart> <body>`.
pub fn emote(sender: &UserId, body: &str) -> String {
    format!(" \\* {} {body}", sender.localpart())
}

/// Text of a desk message as relayed to the room.
pub fn signed(content: &str, first_name: Option<&str>, sign: bool) -> String {
    match first_name {
        Some(name) if sign && !name.is_empty() => format!("{content} - {name}"),
        _ => content.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML for `text`, or `None` when the markdown renders to plain text.
pub fn render_markdown(text: &str) -> Option<String> {
    let mut options = comrak::Options::default();
    options.extension.strikethrough = true;
    options.extension.autolink = true;
    options.render.hardbreaks = true;

    let html = comrak::markdown_to_html(text, &options);
    let html = html.trim_end();
    let inner = html
        .strip_prefix("<p>")
        .and_then(|h| h.strip_suffix("</p>"))
        .filter(|h| !h.contains("<p>"));
    match inner {
        Some(inner) if inner == escape_html(text) => None,
        Some(inner) => Some(inner.to_string()),
        None => Some(html.to_string()),
    }
}

/// Ticket URLs for every reference found in `body`, in order of appearance.
pub fn ticket_links(body: &str, base: &str) -> Vec<String> {
    let base = base.trim_end_matches('/');
    TICKET_PATTERN
        .find_iter(body)
        .map(|m| format!("{base}/{}", m.as_str()))
        .collect()
}

/// Desk display name for a protocol identity.
///
/// Puppets of bridged networks (`@whatsapp_15551234567:example.org`) are
/// named after the remote identity and network; everyone else keeps their
/// full user ID.
pub fn contact_display_name(user: &UserId) -> String {
    let localpart = user.localpart();
    for (prefix, network) in PUPPET_PREFIXES {
        let Some(remote) = localpart.strip_prefix(prefix) else {
            continue;
        };
        if remote.is_empty() {
            break;
        }
        let is_phone = PHONE_NETWORKS.contains(network)
            && remote.chars().all(|c| c.is_ascii_digit());
        return if is_phone {
            format!("+{remote} ({network})")
        } else {
            format!("{remote} ({network})")
        };
    }
    user.to_string()
}

/// Final path segment of a URL, ignoring query and fragment.
pub fn filename_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|s| !s.is_empty())
}
