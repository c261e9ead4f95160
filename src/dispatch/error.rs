//! Dispatch error definitions.

use std::time::Duration;

use thiserror::Error;

use crate::response::{ApiError, ErrorKind};
use crate::transport::TransportError;

/// Errors raised while dispatching a single call.
///
/// Never escapes `Dispatcher::send`; it is folded into the envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Authorization required but no token is set.
    #[error("request requires authorization but no token is set")]
    AuthorizationMissing,

    /// The caller's cancellation token fired first.
    #[error("call cancelled by caller")]
    Cancelled,

    /// The per-call deadline fired first.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized.
    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A 2xx body that is not a valid envelope.
    #[error("response is not a valid envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// A non-2xx status whose body is not an envelope either.
    #[error("server answered HTTP {status} without a readable envelope")]
    Status {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    /// The endpoint could not be resolved to an absolute URL.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("middleware failed: {0}")]
    Middleware(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::AuthorizationMissing => ErrorKind::AuthorizationMissing,
            DispatchError::Cancelled => ErrorKind::UserCancelled,
            DispatchError::Timeout(_) => ErrorKind::Timeout,
            DispatchError::Transport(err) => match err {
                TransportError::Connect(_) | TransportError::Request(_) => ErrorKind::NetworkError,
                TransportError::TimedOut(_) => ErrorKind::Timeout,
                TransportError::Io(_) | TransportError::Codec(_) => ErrorKind::IoError,
            },
            DispatchError::Encode(_) => ErrorKind::UnexpectedError,
            DispatchError::Decode(_) => ErrorKind::DeserializationError,
            DispatchError::Status { .. } => ErrorKind::NetworkError,
            DispatchError::Endpoint { .. } => ErrorKind::ConfigurationError,
            DispatchError::Middleware(_) => ErrorKind::UnexpectedError,
        }
    }

    /// The error as the caller sees it.
    pub fn to_api_error(&self) -> ApiError {
        ApiError::from_kind(self.kind(), self.to_string())
    }
}
