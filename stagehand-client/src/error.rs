//! Client errors.
//!
//! Categorized by whether reconnecting could help.

use serde_json::Value;
use stagehand_wire::TransportError;
use thiserror::Error;

/// Errors from the controller-side client.
///
/// Application-level error payloads never surface here: the server answers
/// them as ordinary responses, which [`Client::request`](crate::Client::request)
/// returns as `Ok`.
#[derive(Debug, Error)]
pub enum ClientError {
    // === Connection-related: reconnecting could help ===
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to connect to {addr} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        source: TransportError,
    },

    #[error("not connected")]
    NotConnected,

    #[error("server closed the connection")]
    Disconnected,

    // === Protocol-level: retrying would not help ===
    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: i64, got: Value },
}

impl ClientError {
    /// Whether tearing the connection down and redialing could help.
    pub fn is_connection_related(&self) -> bool {
        match self {
            Self::Transport(_)
            | Self::ConnectFailed { .. }
            | Self::NotConnected
            | Self::Disconnected => true,
            Self::IdMismatch { .. } => false,
        }
    }
}
