//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and that URLs and
//! addresses actually parse. All errors are returned, not just the first.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ClientConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(base_url) = &config.http.base_url {
        match Url::parse(base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "http.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("http.base_url", e.to_string())),
        }
    }

    if config.http.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("http.connect_timeout_ms", "must be greater than 0"));
    }

    if config.cache.default_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.default_ttl_secs", "must be greater than 0"));
    }

    if config.realtime.enabled {
        match config.realtime.hub_url.as_deref().map(Url::parse) {
            None => errors.push(ValidationError::new(
                "realtime.hub_url",
                "required when realtime is enabled",
            )),
            Some(Ok(url)) if url.scheme() == "ws" || url.scheme() == "wss" => {}
            Some(Ok(url)) => errors.push(ValidationError::new(
                "realtime.hub_url",
                format!("expected ws or wss scheme, got '{}'", url.scheme()),
            )),
            Some(Err(e)) => errors.push(ValidationError::new("realtime.hub_url", e.to_string())),
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
