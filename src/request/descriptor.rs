//! The `ApiRequest` descriptor.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::request::method::{CacheStrategy, CompressionMethod, HttpMethod};

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Pulls an auth token out of a successful response's content.
pub type TokenExtractor<Resp> = Arc<dyn Fn(&Resp) -> String + Send + Sync>;

/// Describes a single API call: where it goes, what it carries and which
/// policies apply to it.
///
/// Built once per call site with the `with_*` builders and only read
/// afterwards. `Resp` is the type the response content decodes into.
pub struct ApiRequest<Req, Resp> {
    method: HttpMethod,
    endpoint: String,
    payload: Req,
    requires_auth: bool,
    cache_strategy: CacheStrategy,
    cache_ttl: Option<Duration>,
    call_timeout: Duration,
    compression: CompressionMethod,
    token_extractor: Option<TokenExtractor<Resp>>,
}

impl<Req, Resp> ApiRequest<Req, Resp> {
    /// Create a descriptor with default policies.
    pub fn new(method: HttpMethod, endpoint: impl Into<String>, payload: Req) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            payload,
            requires_auth: true,
            cache_strategy: CacheStrategy::default(),
            cache_ttl: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            compression: CompressionMethod::default(),
            token_extractor: None,
        }
    }

    pub fn get(endpoint: impl Into<String>, payload: Req) -> Self {
        Self::new(HttpMethod::Get, endpoint, payload)
    }

    pub fn post(endpoint: impl Into<String>, payload: Req) -> Self {
        Self::new(HttpMethod::Post, endpoint, payload)
    }

    pub fn put(endpoint: impl Into<String>, payload: Req) -> Self {
        Self::new(HttpMethod::Put, endpoint, payload)
    }

    pub fn delete(endpoint: impl Into<String>, payload: Req) -> Self {
        Self::new(HttpMethod::Delete, endpoint, payload)
    }

    /// Whether an `Authorization` header is required (default: true).
    pub fn with_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Lifetime of the cached response; the cache default applies when unset.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Capture the session token from this call's successful response.
    pub fn with_token_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Resp) -> String + Send + Sync + 'static,
    {
        self.token_extractor = Some(Arc::new(extractor));
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn payload(&self) -> &Req {
        &self.payload
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn cache_strategy(&self) -> CacheStrategy {
        self.cache_strategy
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    pub fn token_extractor(&self) -> Option<&TokenExtractor<Resp>> {
        self.token_extractor.as_ref()
    }
}

impl<Req: Clone, Resp> Clone for ApiRequest<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            endpoint: self.endpoint.clone(),
            payload: self.payload.clone(),
            requires_auth: self.requires_auth,
            cache_strategy: self.cache_strategy,
            cache_ttl: self.cache_ttl,
            call_timeout: self.call_timeout,
            compression: self.compression,
            token_extractor: self.token_extractor.clone(),
        }
    }
}

impl<Req: fmt::Debug, Resp> fmt::Debug for ApiRequest<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("payload", &self.payload)
            .field("requires_auth", &self.requires_auth)
            .field("cache_strategy", &self.cache_strategy)
            .field("cache_ttl", &self.cache_ttl)
            .field("call_timeout", &self.call_timeout)
            .field("compression", &self.compression)
            .field("token_extractor", &self.token_extractor.is_some())
            .finish()
    }
}
