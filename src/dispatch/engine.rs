//! The dispatch engine.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::cache::{cache_key, ResponseCache};
use crate::config::ClientConfig;
use crate::dispatch::cancel::run_cancellable;
use crate::dispatch::error::DispatchError;
use crate::dispatch::middleware::{Middleware, MiddlewareContext};
use crate::dispatch::token::{SharedToken, TokenProvider};
use crate::observability::metrics;
use crate::request::ApiRequest;
use crate::response::ApiResponse;
use crate::transport::{
    codec, ProtocolVersion, ReqwestTransport, Transport, TransportError, WireRequest, WireResponse,
};

/// Header carrying the per-call request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request body wrapper: `{"content": <payload>}`.
#[derive(Serialize)]
struct RequestBody<'a, T: Serialize> {
    content: &'a T,
}

/// Runs `ApiRequest`s end to end.
///
/// Cheap to clone; clones share the transport, cache, token and middleware.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    tokens: Arc<dyn TokenProvider>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    base_url: Option<Url>,
    protocol: ProtocolVersion,
    auth_scheme: String,
}

impl Dispatcher {
    pub fn builder(transport: Arc<dyn Transport>) -> DispatcherBuilder {
        DispatcherBuilder::new(transport)
    }

    /// Build a dispatcher with the reqwest transport and an in-memory cache.
    pub fn from_config(config: &ClientConfig) -> Result<Self, DispatchError> {
        Ok(Self::configure(config)?.build())
    }

    /// A builder preloaded from `config`, for adding middleware or a
    /// custom cache before building.
    pub fn configure(config: &ClientConfig) -> Result<DispatcherBuilder, DispatchError> {
        let transport = ReqwestTransport::new(&config.http)?;
        let mut builder = Self::builder(Arc::new(transport))
            .protocol(config.http.protocol)
            .auth_scheme(config.http.auth_scheme.clone())
            .cache(ResponseCache::in_memory(Duration::from_secs(
                config.cache.default_ttl_secs,
            )));

        if let Some(base_url) = &config.http.base_url {
            builder = builder.base_url(base_url)?;
        }

        Ok(builder)
    }

    /// The shared token; clear it here on logout.
    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Dispatch one call.
    ///
    /// Always returns an envelope: failures at any step come back as an
    /// `error` with a client-side `ErrorKind` code.
    pub async fn send<Req, Resp>(
        &self,
        request: &ApiRequest<Req, Resp>,
        cancel: Option<&CancellationToken>,
    ) -> ApiResponse<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Serialize + Clone + Send + Sync + 'static,
    {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "dispatch",
            %request_id,
            method = %request.method(),
            endpoint = request.endpoint()
        );
        let started = Instant::now();

        let result = self.dispatch(request, cancel, request_id).instrument(span.clone()).await;
        let elapsed = started.elapsed();
        let method = request.method().as_str();

        let _enter = span.enter();
        match result {
            Ok(envelope) => {
                let outcome = if envelope.is_from_cache {
                    "cache_hit"
                } else if envelope.is_success() {
                    "success"
                } else {
                    "api_error"
                };
                tracing::debug!(outcome, elapsed_ms = elapsed.as_millis() as u64, "Call completed");
                metrics::record_request(method, outcome, elapsed);
                envelope
            }
            Err(err) => {
                let kind = err.kind();
                tracing::warn!(kind = kind.as_label(), error = %err, "Call failed");
                metrics::record_request(method, kind.as_label(), elapsed);
                ApiResponse::failure(err.to_api_error())
            }
        }
    }

    async fn dispatch<Req, Resp>(
        &self,
        request: &ApiRequest<Req, Resp>,
        cancel: Option<&CancellationToken>,
        request_id: Uuid,
    ) -> Result<ApiResponse<Resp>, DispatchError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Serialize + Clone + Send + Sync + 'static,
    {
        let strategy = request.cache_strategy();
        let key = cache_key(request.endpoint(), request.method(), request.payload())
            .map_err(DispatchError::Encode)?;

        // Hits skip token capture and middleware.
        if let Some(hit) = self.cache.get::<Resp>(&key, strategy) {
            tracing::debug!("Served from cache");
            return Ok(hit);
        }

        let timeout = request.call_timeout();
        let deadline = Instant::now() + timeout;

        let wire = self.build_request(request, request_id)?;
        let reply = run_cancellable(self.transport.execute(wire), deadline, timeout, cancel).await??;
        let mut envelope = decode_envelope::<Resp>(&reply)?;

        if let (Some(extract), Some(content)) = (request.token_extractor(), envelope.content.as_ref()) {
            self.tokens.set_token(extract(content));
            tracing::debug!("Session token updated");
        }

        if !self.middleware.is_empty() {
            envelope = self.run_middleware(request, request_id, envelope).await?;
        }

        // Cached after middleware so a hit matches what this call returns.
        self.cache.set(&key, Some(&envelope), strategy, request.cache_ttl());

        Ok(envelope)
    }

    fn build_request<Req, Resp>(
        &self,
        request: &ApiRequest<Req, Resp>,
        request_id: Uuid,
    ) -> Result<WireRequest, DispatchError>
    where
        Req: Serialize,
    {
        let mut headers = vec![(X_REQUEST_ID.to_string(), request_id.to_string())];

        if request.requires_auth() {
            let token = self.tokens.token().ok_or(DispatchError::AuthorizationMissing)?;
            headers.push(("authorization".to_string(), self.authorization_value(&token)));
        }

        let mut url = self.resolve_endpoint(request.endpoint())?;
        let method = request.method();

        let (body, content_encoding) = if method.carries_body() {
            let json = serde_json::to_vec(&RequestBody {
                content: request.payload(),
            })
            .map_err(DispatchError::Encode)?;
            let encoded =
                codec::encode(&json, request.compression()).map_err(TransportError::Codec)?;
            (Some(encoded.bytes), encoded.content_encoding)
        } else {
            append_query(&mut url, request.payload())?;
            (None, None)
        };

        Ok(WireRequest {
            method,
            url,
            version: self.protocol,
            headers,
            body,
            content_encoding,
        })
    }

    fn authorization_value(&self, token: &str) -> String {
        if self.auth_scheme.is_empty() {
            token.to_string()
        } else {
            format!("{} {}", self.auth_scheme, token)
        }
    }

    fn resolve_endpoint(&self, endpoint: &str) -> Result<Url, DispatchError> {
        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(endpoint).map_err(|e| DispatchError::Endpoint {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }),
                None => Err(DispatchError::Endpoint {
                    endpoint: endpoint.to_string(),
                    reason: "relative endpoint and no base URL configured".to_string(),
                }),
            },
            Err(e) => Err(DispatchError::Endpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn run_middleware<Req, Resp>(
        &self,
        request: &ApiRequest<Req, Resp>,
        request_id: Uuid,
        envelope: ApiResponse<Resp>,
    ) -> Result<ApiResponse<Resp>, DispatchError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Serialize,
    {
        let request_json = serde_json::to_value(request.payload()).map_err(DispatchError::Encode)?;
        let mut erased = ApiResponse {
            content: envelope
                .content
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(DispatchError::Encode)?,
            error: envelope.error,
            is_from_cache: false,
        };

        for middleware in self.middleware.iter() {
            let mut ctx = MiddlewareContext {
                request_id,
                method: request.method(),
                endpoint: request.endpoint(),
                request: &request_json,
                response: &mut erased,
            };
            middleware
                .handle(&mut ctx)
                .await
                .map_err(|e| DispatchError::Middleware(e.to_string()))?;
        }

        Ok(ApiResponse {
            content: erased
                .content
                .map(serde_json::from_value::<Resp>)
                .transpose()
                .map_err(DispatchError::Decode)?,
            error: erased.error,
            is_from_cache: false,
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("protocol", &self.protocol)
            .field("middleware", &self.middleware.len())
            .field("cached_entries", &self.cache.len())
            .finish()
    }
}

/// Decode a reply body into the `{content, error}` envelope.
fn decode_envelope<Resp: DeserializeOwned>(
    reply: &WireResponse,
) -> Result<ApiResponse<Resp>, DispatchError> {
    match serde_json::from_str::<ApiResponse<Resp>>(&reply.body) {
        Ok(envelope) => Ok(envelope),
        Err(source) if !reply.is_success() => Err(DispatchError::Status {
            status: reply.status,
            source,
        }),
        Err(source) => Err(DispatchError::Decode(source)),
    }
}

/// Flatten the payload's top-level fields into the query string.
///
/// Nulls are skipped; nested arrays and objects are sent as JSON text.
fn append_query<P: Serialize + ?Sized>(url: &mut Url, payload: &P) -> Result<(), DispatchError> {
    let Value::Object(fields) = serde_json::to_value(payload).map_err(DispatchError::Encode)? else {
        return Ok(());
    };

    let pairs: Vec<(String, String)> = fields
        .into_iter()
        .filter_map(|(name, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((name, s)),
            other => Some((name, other.to_string())),
        })
        .collect();

    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(())
}

/// Assembles a `Dispatcher`.
pub struct DispatcherBuilder {
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    tokens: Option<Arc<dyn TokenProvider>>,
    middleware: Vec<Arc<dyn Middleware>>,
    base_url: Option<Url>,
    protocol: ProtocolVersion,
    auth_scheme: String,
}

impl DispatcherBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            tokens: None,
            middleware: Vec::new(),
            base_url: None,
            protocol: ProtocolVersion::default(),
            auth_scheme: "Bearer".to_string(),
        }
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Append a middleware; they run in the order registered.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn base_url(mut self, base_url: &str) -> Result<Self, DispatchError> {
        let url = Url::parse(base_url).map_err(|e| DispatchError::Endpoint {
            endpoint: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = Some(url);
        Ok(self)
    }

    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            transport: self.transport,
            cache: self.cache.unwrap_or_default(),
            tokens: self.tokens.unwrap_or_else(|| Arc::new(SharedToken::new())),
            middleware: self.middleware.into(),
            base_url: self.base_url,
            protocol: self.protocol,
            auth_scheme: self.auth_scheme,
        }
    }
}
