//! Request descriptors.
//!
//! # Data Flow
//! ```text
//! call site
//!     → ApiRequest::post(endpoint, payload).with_*(..)   (built once, then read-only)
//!     → Dispatcher::send(&request, cancel)
//! ```
//!
//! # Design Decisions
//! - Descriptors are immutable after construction; builders consume `self`
//! - Response type is carried as a type parameter, never stored
//! - Policy enums default to the values most call sites want

pub mod descriptor;
pub mod method;

pub use descriptor::{ApiRequest, TokenExtractor, DEFAULT_CALL_TIMEOUT};
pub use method::{CacheStrategy, CompressionMethod, HttpMethod};
