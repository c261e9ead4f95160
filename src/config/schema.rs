//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::transport::ProtocolVersion;

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Outbound HTTP settings.
    pub http: HttpConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Realtime push channel settings.
    pub realtime: RealtimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL that relative endpoints are joined onto.
    pub base_url: Option<String>,

    /// Protocol version requested on every call.
    pub protocol: ProtocolVersion,

    /// Scheme placed before the token in the `Authorization` header.
    /// An empty scheme sends the bare token.
    pub auth_scheme: String,

    /// `User-Agent` header value.
    pub user_agent: String,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// How long idle pooled connections are kept, in seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            protocol: ProtocolVersion::Http1,
            auth_scheme: "Bearer".to_string(),
            user_agent: concat!("apiwire/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_ms: 5_000,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a request does not set one, in seconds.
    pub default_ttl_secs: u64,

    /// Interval of the expired-entry sweeper (0 = disabled).
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300, // 5 minutes
            sweep_interval_secs: 60,
        }
    }
}

/// Realtime push channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable the push channel.
    pub enabled: bool,

    /// WebSocket hub URL (ws:// or wss://).
    pub hub_url: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
        }
    }
}
