//! Error payload carried inside an envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A failed call, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub details: String,
}

impl ApiError {
    pub fn new(code: i32, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            code,
            title: title.into(),
            details: details.into(),
        }
    }

    /// Build a client-side error of the given kind.
    pub fn from_kind(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self::new(kind.code(), kind.title(), details)
    }

    /// The client-side kind, if this error was produced locally.
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.title)?;
        if !self.details.is_empty() {
            write!(f, ": {}", self.details)?;
        }
        Ok(())
    }
}

/// Client-side failure categories.
///
/// Codes are negative so they never collide with codes defined by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthorizationMissing,
    UserCancelled,
    Timeout,
    NetworkError,
    IoError,
    DeserializationError,
    ConfigurationError,
    UnexpectedError,
}

impl ErrorKind {
    const ALL: [ErrorKind; 8] = [
        ErrorKind::AuthorizationMissing,
        ErrorKind::UserCancelled,
        ErrorKind::Timeout,
        ErrorKind::NetworkError,
        ErrorKind::IoError,
        ErrorKind::DeserializationError,
        ErrorKind::ConfigurationError,
        ErrorKind::UnexpectedError,
    ];

    /// Stable numeric code.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::AuthorizationMissing => -1,
            ErrorKind::UserCancelled => -2,
            ErrorKind::Timeout => -3,
            ErrorKind::NetworkError => -4,
            ErrorKind::IoError => -5,
            ErrorKind::DeserializationError => -6,
            ErrorKind::ConfigurationError => -7,
            ErrorKind::UnexpectedError => -8,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::AuthorizationMissing => "Authorization missing",
            ErrorKind::UserCancelled => "Cancelled by caller",
            ErrorKind::Timeout => "Request timed out",
            ErrorKind::NetworkError => "Network error",
            ErrorKind::IoError => "I/O error",
            ErrorKind::DeserializationError => "Invalid response body",
            ErrorKind::ConfigurationError => "Configuration error",
            ErrorKind::UnexpectedError => "Unexpected error",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Short label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::AuthorizationMissing => "authorization_missing",
            ErrorKind::UserCancelled => "user_cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::IoError => "io_error",
            ErrorKind::DeserializationError => "deserialization_error",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique_and_reversible() {
        for kind in ErrorKind::ALL {
            assert!(kind.code() < 0);
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(404), None);
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::from_kind(ErrorKind::Timeout, "after 10s");
        assert_eq!(err.to_string(), "[-3] Request timed out: after 10s");
        assert_eq!(err.kind(), Some(ErrorKind::Timeout));

        let server = ApiError::new(404, "Not found", "");
        assert_eq!(server.to_string(), "[404] Not found");
        assert_eq!(server.kind(), None);
    }

    #[test]
    fn test_error_decodes_with_missing_fields() {
        let err: ApiError = serde_json::from_str(r#"{"code": 7}"#).unwrap();
        assert_eq!(err.code, 7);
        assert!(err.title.is_empty());
    }
}
