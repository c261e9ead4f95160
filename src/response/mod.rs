//! Response envelopes.
//!
//! Every call returns an `ApiResponse<T>`: either content or an `ApiError`,
//! never a raw fault. Client-side failures use the negative codes of
//! `ErrorKind`; server-side errors keep whatever code the server sent.

pub mod envelope;
pub mod error;

pub use envelope::ApiResponse;
pub use error::{ApiError, ErrorKind};
