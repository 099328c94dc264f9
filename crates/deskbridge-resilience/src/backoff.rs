// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fibonacci backoff delays.

use std::time::Duration;

/// Infinite iterator of delays `unit * (1, 1, 2, 3, 5, 8, ...)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    unit: Duration,
    max: Option<Duration>,
    current: u64,
    next: u64,
}

impl FibonacciBackoff {
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            max: None,
            current: 1,
            next: 1,
        }
    }

    /// Never yield a delay longer than `max`.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    /// Start the sequence over (after a success).
    pub fn reset(&mut self) {
        self.current = 1;
        self.next = 1;
    }
}

impl Iterator for FibonacciBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let factor = u32::try_from(self.current).unwrap_or(u32::MAX);
        let delay = self.unit.saturating_mul(factor);
        let following = self.current.saturating_add(self.next);
        self.current = self.next;
        self.next = following;
        Some(match self.max {
            Some(max) => delay.min(max),
            None => delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_fibonacci_multiples() {
        let delays: Vec<u64> = FibonacciBackoff::new(Duration::from_millis(100))
            .take(6)
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 100, 200, 300, 500, 800]);
    }

    #[test]
    fn cap_and_reset() {
        let mut backoff =
            FibonacciBackoff::new(Duration::from_secs(1)).with_max(Duration::from_secs(3));
        let delays: Vec<_> = backoff.by_ref().take(6).collect();
        assert_eq!(delays.last(), Some(&Duration::from_secs(3)));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));

        backoff.reset();
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
    }
}
