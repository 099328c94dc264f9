// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP receiver for support-desk webhooks.
//!
//! Parses each delivery into a [`WebhookEvent`](deskbridge_core::desk::WebhookEvent)
//! and hands it to a [`WebhookHandler`](deskbridge_core::traits::WebhookHandler).

pub mod handlers;
pub mod server;

pub use server::{GatewayState, ServerConfig, router, start_server};
