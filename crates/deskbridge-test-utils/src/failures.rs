// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted failures for mock collaborators.

use std::collections::HashMap;

/// Per-operation count of upcoming failures and the HTTP status to report.
///
/// A failure is either rejected (nothing happens) or lost (the operation
/// takes effect but the caller still sees the error).
#[derive(Debug, Default)]
pub(crate) struct FailurePlan {
    pending: HashMap<String, (u32, u16)>,
    lost: HashMap<String, (u32, u16)>,
}

impl FailurePlan {
    pub(crate) fn arm(&mut self, operation: &str, times: u32, status: u16) {
        self.pending.insert(operation.to_string(), (times, status));
    }

    pub(crate) fn arm_lost(&mut self, operation: &str, times: u32, status: u16) {
        self.lost.insert(operation.to_string(), (times, status));
    }

    /// Consume one scripted failure for `operation`, returning its status.
    pub(crate) fn take(&mut self, operation: &str) -> Option<u16> {
        consume(&mut self.pending, operation)
    }

    /// Consume one scripted lost response for `operation`.
    pub(crate) fn take_lost(&mut self, operation: &str) -> Option<u16> {
        consume(&mut self.lost, operation)
    }
}

fn consume(plan: &mut HashMap<String, (u32, u16)>, operation: &str) -> Option<u16> {
    let (remaining, status) = plan.get_mut(operation)?;
    if *remaining == 0 {
        return None;
    }
    *remaining -= 1;
    Some(*status)
}
