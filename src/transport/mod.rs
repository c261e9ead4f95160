//! Wire transport subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → codec.rs (compress JSON body, pick Content-Encoding)
//!     → WireRequest
//!     → Transport::execute (http.rs: reqwest)
//!     → WireResponse { status, body text }
//! ```
//!
//! # Design Decisions
//! - The dispatcher only sees the `Transport` trait; tests swap in fakes
//! - Cancellation is applied around `execute` by the caller, not inside it
//! - Response decompression is the HTTP client's job

pub mod codec;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::request::HttpMethod;

pub use codec::{decode, encode, EncodedBody};
pub use http::ReqwestTransport;

/// HTTP protocol version used for outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    #[default]
    Http1,
    Http2,
}

impl From<ProtocolVersion> for reqwest::Version {
    fn from(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Http1 => reqwest::Version::HTTP_11,
            ProtocolVersion::Http2 => reqwest::Version::HTTP_2,
        }
    }
}

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub version: ProtocolVersion,
    pub headers: Vec<(String, String)>,
    /// JSON body, already compressed when `content_encoding` is set.
    pub body: Option<Vec<u8>>,
    pub content_encoding: Option<&'static str>,
}

impl WireRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and text body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors raised below the envelope layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The client's own deadline fired.
    #[error("transport timed out: {0}")]
    TimedOut(String),

    /// Reading or writing a body failed.
    #[error("body I/O failed: {0}")]
    Io(String),

    /// Body compression failed.
    #[error("compression failed: {0}")]
    Codec(#[from] std::io::Error),

    /// Any other request-level failure.
    #[error("request failed: {0}")]
    Request(String),
}

/// Something able to carry a `WireRequest` to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportError>;
}
