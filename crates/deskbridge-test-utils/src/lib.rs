// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for deskbridge integration tests.
//!
//! Provides mock collaborators and a test harness for fast,
//! deterministic tests without a homeserver or desk.
//!
//! # Components
//!
//! - [`MockProtocol`] - In-memory chat-protocol client
//! - [`MockDesk`] - In-memory support desk
//! - [`MockProvisioner`] - Fixed-room start-new-chat provisioner
//! - [`TestHarness`] - Engine assembled over the mocks

mod failures;
pub mod harness;
pub mod mock_desk;
pub mod mock_protocol;
pub mod mock_provisioner;

pub use harness::{BOT, TestHarness};
pub use mock_desk::MockDesk;
pub use mock_protocol::MockProtocol;
pub use mock_provisioner::MockProvisioner;
