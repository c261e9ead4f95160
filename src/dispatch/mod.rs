//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher::send(&ApiRequest, cancel)
//!     → cache lookup (hit: return flagged copy, nothing else runs)
//!     → build WireRequest (auth header from TokenProvider, body via codec)
//!     → cancel.rs (caller cancellation ∧ per-call deadline around Transport)
//!     → decode {content, error} envelope
//!     → token capture → middleware pipeline → cache store
//!     → ApiResponse (every failure folded into `error`)
//! ```
//!
//! # Design Decisions
//! - `send` never returns a raw fault; internal steps use `DispatchError`
//! - The token is a last-writer-wins cell shared by all in-flight calls
//! - No retries: failures are surfaced to the caller as they happen

pub mod cancel;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod token;

pub use engine::{Dispatcher, DispatcherBuilder};
pub use error::DispatchError;
pub use middleware::{Middleware, MiddlewareContext, MiddlewareError, TracingMiddleware};
pub use token::{SharedToken, TokenProvider};
