//! Typed API client: request dispatch, response caching and realtime updates.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod observability;
pub mod realtime;
pub mod request;
pub mod response;
pub mod transport;

pub use config::schema::ClientConfig;
pub use dispatch::{Dispatcher, DispatcherBuilder, Middleware, SharedToken, TokenProvider};
pub use realtime::{LiveResponse, RealtimeDescriptor, RealtimeHub, RealtimeRegistry};
pub use request::{ApiRequest, CacheStrategy, CompressionMethod, HttpMethod};
pub use response::{ApiError, ApiResponse, ErrorKind};
