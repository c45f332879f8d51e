//! Communication error types

use thiserror::Error;

/// Errors from the communication group. Every variant is fatal for the
/// process that observes it: there is no retry policy anywhere in the
/// protocol.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wire format error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol desynchronization: expected {expected}, got {got}")]
    Protocol { expected: &'static str, got: String },

    #[error("Communication channel closed")]
    ChannelClosed,

    #[error("No route to rank {0}")]
    NoRoute(u32),
}

impl CommError {
    /// Build a protocol-desync error from an unexpected frame body.
    pub fn unexpected(expected: &'static str, got: &impl std::fmt::Debug) -> Self {
        CommError::Protocol {
            expected,
            got: format!("{got:?}"),
        }
    }
}
