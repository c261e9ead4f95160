//! End-to-end dispatch against a mock HTTP API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use apiwire::config::ClientConfig;
use apiwire::dispatch::{Middleware, MiddlewareContext, MiddlewareError};
use apiwire::request::{ApiRequest, CacheStrategy, CompressionMethod};
use apiwire::{Dispatcher, ErrorKind, TokenProvider};

mod common;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Credentials {
    user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Session {
    token: String,
    user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Profile {
    name: String,
}

async fn live_dispatcher() -> Dispatcher {
    let addr = common::start_mock_api().await;
    let mut config = ClientConfig::default();
    config.http.base_url = Some(format!("http://{addr}/"));
    Dispatcher::from_config(&config).unwrap()
}

fn login_request() -> ApiRequest<Credentials, Session> {
    ApiRequest::post("login", Credentials { user: "ada".into() })
        .with_auth(false)
        .with_cache_strategy(CacheStrategy::Disabled)
        .with_token_extractor(|session: &Session| session.token.clone())
}

#[tokio::test]
async fn test_login_then_authenticated_call() {
    let dispatcher = live_dispatcher().await;

    let session = dispatcher.send(&login_request(), None).await;
    assert!(session.is_success(), "{:?}", session.error);
    assert_eq!(session.content.unwrap().user, "ada");
    assert_eq!(dispatcher.tokens().token().as_deref(), Some(common::ISSUED_TOKEN));

    let me: ApiRequest<(), Profile> = ApiRequest::get("me", ()).with_cache_strategy(CacheStrategy::Disabled);
    let profile = dispatcher.send(&me, None).await;
    assert_eq!(profile.content, Some(Profile { name: "ada".into() }));
}

#[tokio::test]
async fn test_server_error_envelope_is_passed_through() {
    let dispatcher = live_dispatcher().await;
    dispatcher.tokens().set_token("stale".into());

    let me: ApiRequest<(), Profile> = ApiRequest::get("me", ()).with_cache_strategy(CacheStrategy::Disabled);
    let response = dispatcher.send(&me, None).await;
    assert!(!response.is_success());
    let error = response.error.unwrap();
    assert_eq!(error.code, 401);
    assert_eq!(error.title, "Unauthorized");
}

#[tokio::test]
async fn test_missing_token_fails_before_network() {
    let transport = common::CountingTransport::replying(json!({"content": {"name": "ada"}}));
    let dispatcher = Dispatcher::builder(transport.clone())
        .base_url("http://api.test/")
        .unwrap()
        .build();

    let me: ApiRequest<(), Profile> = ApiRequest::get("me", ());
    let response = dispatcher.send(&me, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AuthorizationMissing));
    assert_eq!(response.error.unwrap().code, -1);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_get_payload_becomes_query_string() {
    let dispatcher = live_dispatcher().await;

    let request: ApiRequest<Value, Value> = ApiRequest::get(
        "search",
        json!({"q": "rust lang", "page": 2, "filter": null, "tags": ["a", "b"]}),
    )
    .with_auth(false);
    let response = dispatcher.send(&request, None).await;
    assert_eq!(
        response.content,
        Some(json!({"q": "rust lang", "page": "2", "tags": "[\"a\",\"b\"]"}))
    );
}

#[tokio::test]
async fn test_body_compression_methods() {
    let dispatcher = live_dispatcher().await;

    for (method, expected) in [
        (CompressionMethod::GZip, "gzip"),
        (CompressionMethod::Deflate, "deflate"),
        (CompressionMethod::None, "identity"),
    ] {
        let request: ApiRequest<Value, Value> = ApiRequest::post("echo", json!({"n": 1, "text": "hello"}))
            .with_auth(false)
            .with_cache_strategy(CacheStrategy::Disabled)
            .with_compression(method);
        let response = dispatcher.send(&request, None).await;
        assert_eq!(
            response.content,
            Some(json!({"encoding": expected, "received": {"n": 1, "text": "hello"}})),
            "{method:?}"
        );
    }
}

#[tokio::test]
async fn test_unreadable_bodies_map_by_status() {
    let dispatcher = live_dispatcher().await;

    let broken: ApiRequest<(), Value> = ApiRequest::get("broken", ()).with_auth(false);
    let response = dispatcher.send(&broken, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NetworkError));
    assert!(response.error.unwrap().details.contains("502"));

    let garbage: ApiRequest<(), Value> = ApiRequest::get("garbage", ()).with_auth(false);
    let response = dispatcher.send(&garbage, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::DeserializationError));
    assert_eq!(response.error.unwrap().code, -6);
}

#[tokio::test]
async fn test_timeout_and_cancellation() {
    let dispatcher = live_dispatcher().await;

    let slow: ApiRequest<(), Value> = ApiRequest::get("slow", ())
        .with_auth(false)
        .with_timeout(Duration::from_millis(100));
    let response = dispatcher.send(&slow, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::Timeout));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let slow = slow.with_timeout(Duration::from_secs(3));
    let response = dispatcher.send(&slow, Some(&cancel)).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::UserCancelled));
    assert_eq!(response.error.unwrap().code, -2);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let dispatcher = Dispatcher::from_config(&ClientConfig::default()).unwrap();
    let request: ApiRequest<(), Value> = ApiRequest::get("http://127.0.0.1:1/nothing", ()).with_auth(false);
    let response = dispatcher.send(&request, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NetworkError));
}

#[tokio::test]
async fn test_relative_endpoint_without_base_url() {
    let transport = common::CountingTransport::replying(json!({"content": 1}));
    let dispatcher = Dispatcher::builder(transport.clone()).build();

    let request: ApiRequest<(), u32> = ApiRequest::get("relative/path", ()).with_auth(false);
    let response = dispatcher.send(&request, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::ConfigurationError));
    assert_eq!(transport.calls(), 0);
}

/// Stamps the endpoint into the content and counts invocations.
#[derive(Default)]
struct Stamp {
    runs: AtomicUsize,
}

#[async_trait]
impl Middleware for Stamp {
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(Value::Object(content)) = ctx.response.content.as_mut() {
            content.insert("stampedBy".into(), json!(ctx.endpoint));
        }
        Ok(())
    }
}

struct Reject;

#[async_trait]
impl Middleware for Reject {
    async fn handle(&self, _ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> {
        Err("rejected by policy".into())
    }
}

#[tokio::test]
async fn test_middleware_rewrites_envelope_but_not_cache_hits() {
    let transport = common::CountingTransport::replying(json!({"content": {"name": "ada"}}));
    let stamp = Arc::new(Stamp::default());
    let dispatcher = Dispatcher::builder(transport.clone())
        .base_url("http://api.test/")
        .unwrap()
        .middleware(stamp.clone())
        .build();

    let request: ApiRequest<(), Value> = ApiRequest::get("profile", ())
        .with_auth(false)
        .with_cache_strategy(CacheStrategy::Enabled);

    let first = dispatcher.send(&request, None).await;
    assert_eq!(first.content, Some(json!({"name": "ada", "stampedBy": "profile"})));

    let second = dispatcher.send(&request, None).await;
    assert!(second.is_from_cache);
    assert_eq!(second.content, first.content);
    assert_eq!(transport.calls(), 1);
    assert_eq!(stamp.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_error_is_unexpected() {
    let transport = common::CountingTransport::replying(json!({"content": 1}));
    let dispatcher = Dispatcher::builder(transport)
        .base_url("http://api.test/")
        .unwrap()
        .middleware(Arc::new(Reject))
        .build();

    let request: ApiRequest<(), u32> = ApiRequest::get("n", ())
        .with_auth(false)
        .with_cache_strategy(CacheStrategy::Enabled);
    let response = dispatcher.send(&request, None).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::UnexpectedError));
    assert!(response.error.unwrap().details.contains("rejected by policy"));
    assert!(dispatcher.cache().is_empty());
}

#[tokio::test]
async fn test_request_id_header_is_unique_per_call() {
    let transport = common::CountingTransport::replying(json!({"content": 1}));
    let dispatcher = Dispatcher::builder(transport.clone())
        .base_url("http://api.test/")
        .unwrap()
        .build();

    let request: ApiRequest<(), u32> = ApiRequest::get("n", ())
        .with_auth(false)
        .with_cache_strategy(CacheStrategy::Disabled);
    dispatcher.send(&request, None).await;
    let first = transport.last_request().unwrap();
    dispatcher.send(&request, None).await;
    let second = transport.last_request().unwrap();

    let first_id = first.header("x-request-id").unwrap().to_string();
    assert_eq!(first_id.len(), 36);
    assert_ne!(Some(first_id.as_str()), second.header("x-request-id"));
}
