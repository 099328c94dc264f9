// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the deskbridge synchronization engine.

use thiserror::Error;

/// The primary error type used across all deskbridge crates and collaborator traits.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (invalid TOML, missing secrets, bad identifiers).
    #[error("configuration error: {0}")]
    Config(String),

    /// Identity store errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat-protocol (Matrix) transport or API errors.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        /// HTTP status code when the homeserver answered.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Support-desk (Chatwoot) transport or API errors.
    #[error("desk error: {message}")]
    Desk {
        message: String,
        /// HTTP status code when the desk answered.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A link, event, or desk record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input: size mismatch, bad content URI, unsupported kind.
    #[error("validation error: {0}")]
    Validation(String),

    /// The room or conversation is not eligible for bridging.
    #[error("policy rejection: {0}")]
    Policy(String),

    /// The surrounding context was cancelled (shutdown).
    #[error("operation cancelled")]
    Cancelled,

    /// Several independent per-item operations failed.
    #[error("{count} operations failed: {summary}", count = .0.len(), summary = summarize(.0))]
    Aggregate(Vec<BridgeError>),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

fn summarize(errors: &[BridgeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl BridgeError {
    /// Protocol error without a status code or source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Desk error without a status code or source.
    pub fn desk(message: impl Into<String>) -> Self {
        Self::Desk {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// HTTP status attached to a protocol or desk error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } | Self::Desk { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the retry executor should attempt the operation again.
    ///
    /// Transport failures without a status, 408, 429, and 5xx are transient.
    /// Validation, policy, not-found, and cancellation never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { .. } => true,
            Self::Protocol { status, .. } | Self::Desk { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500 || *code == 429 || *code == 408,
            },
            Self::Aggregate(errors) => errors.iter().any(BridgeError::is_retryable),
            Self::Config(_)
            | Self::NotFound(_)
            | Self::Validation(_)
            | Self::Policy(_)
            | Self::Cancelled
            | Self::Internal(_) => false,
        }
    }

    /// Whether this is the expected "nothing linked yet" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
