//! The uniform success/error wrapper.

use serde::{Deserialize, Serialize};

use crate::response::error::{ApiError, ErrorKind};

/// Result of one dispatched call.
///
/// Wire shape: `{"content": <T>|null, "error": {code, title, details}|null}`.
/// `is_from_cache` is local bookkeeping and never travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub content: Option<T>,
    pub error: Option<ApiError>,
    #[serde(skip)]
    pub is_from_cache: bool,
}

impl<T> ApiResponse<T> {
    pub fn success(content: T) -> Self {
        Self {
            content: Some(content),
            error: None,
            is_from_cache: false,
        }
    }

    pub fn failure(error: ApiError) -> Self {
        Self {
            content: None,
            error: Some(error),
            is_from_cache: false,
        }
    }

    /// A client-side failure of the given kind.
    pub fn from_kind(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self::failure(ApiError::from_kind(kind, details))
    }

    /// True when no error is present.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Kind of a locally produced failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().and_then(ApiError::kind)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            content: self.content.map(f),
            error: self.error,
            is_from_cache: self.is_from_cache,
        }
    }

    /// Convert into a `Result`, dropping the cache flag.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.content),
        }
    }
}

impl<T> Default for ApiResponse<T> {
    fn default() -> Self {
        Self {
            content: None,
            error: None,
            is_from_cache: false,
        }
    }
}
