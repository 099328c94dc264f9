// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for deskbridge: Fibonacci backoff and the bounded
//! retry executor that wraps every outbound network call.

pub mod backoff;
pub mod retry;

pub use backoff::FibonacciBackoff;
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
