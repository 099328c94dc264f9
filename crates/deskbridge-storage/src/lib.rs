// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite identity store for deskbridge.
//!
//! WAL-mode SQLite with embedded refinery migrations, reached through
//! `tokio-rusqlite`'s single background connection. Holds the room and
//! conversation links, the event and message links that double as the
//! deduplication record, and the room metadata the sync loop observes.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use database::Database;
pub use models::{ConversationLink, MessagePart};
pub use store::IdentityStore;
