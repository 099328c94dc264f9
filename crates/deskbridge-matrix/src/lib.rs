// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matrix side of deskbridge.
//!
//! [`MatrixClient`] implements the engine's `ProtocolClient` on top of
//! `matrix-sdk`, which owns the session, end-to-end encryption and the room
//! state cache. [`SyncLoop`] drives `/sync`, and [`SyncProcessor`] feeds
//! authorized timeline events to the engine.

pub mod client;
pub mod sync;

pub use client::{MatrixClient, MatrixSettings};
pub use sync::{SenderFilter, SyncBatch, SyncLoop, SyncProcessor};
