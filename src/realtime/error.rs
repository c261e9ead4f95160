//! Realtime error definitions.

use thiserror::Error;

/// Errors raised by the realtime subsystem.
///
/// Unlike dispatch failures these are returned to the caller directly.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Missing or malformed realtime metadata, or no identifier value.
    #[error("realtime configuration error: {0}")]
    Configuration(String),

    /// The push channel is no longer connected.
    #[error("push channel closed")]
    ChannelClosed,

    #[error("failed to connect push channel: {0}")]
    Connect(String),

    /// A frame or field value did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("failed to encode realtime payload: {0}")]
    Encode(#[from] serde_json::Error),
}
