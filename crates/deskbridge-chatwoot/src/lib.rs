// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatwoot adapter for deskbridge.
//!
//! [`ChatwootClient`] implements the desk client trait against the Chatwoot
//! application API; [`StartNewChatProvisioner`] creates rooms for
//! conversations that start on the desk side.

pub mod client;
mod payloads;
pub mod provision;

pub use client::ChatwootClient;
pub use provision::StartNewChatProvisioner;
