// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry executor.
//!
//! Every outbound call the engine makes goes through [`RetryPolicy::run`]:
//! up to `max_attempts` tries separated by Fibonacci delays, stopping early
//! on errors that can never succeed and on cancellation.

use std::future::Future;
use std::time::Duration;

use deskbridge_core::BridgeError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backoff::FibonacciBackoff;

/// Default total attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    cancel: CancellationToken,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, CancellationToken::new())
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            cancel,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The shutdown token this policy observes.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number so re-attempts can first
    /// check whether an earlier, unconfirmed attempt already took effect.
    /// Returns the last error on exhaustion and [`BridgeError::Cancelled`]
    /// if the token fires before or between attempts.
    pub async fn run<T, F, Fut>(&self, description: &str, mut op: F) -> Result<T, BridgeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        let mut delays = FibonacciBackoff::new(self.base_delay);
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }

            let err = match op(attempt).await {
                Ok(value) => {
                    debug!(operation = description, attempt, "attempt succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(operation = description, attempt, error = %err, "permanent failure, not retrying");
                return Err(err);
            }
            if attempt >= self.max_attempts {
                error!(operation = description, attempt, error = %err, "giving up after final attempt");
                return Err(err);
            }

            let delay = delays.next().unwrap_or(self.base_delay);
            warn!(
                operation = description,
                attempt,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "attempt failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(BridgeError::Cancelled),
            }
            attempt += 1;
        }
    }
}
