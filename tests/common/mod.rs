//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;

use apiwire::realtime::Frame;
use apiwire::transport::{decode, Transport, TransportError, WireRequest, WireResponse};

/// Token issued by the mock API's `/login`.
pub const ISSUED_TOKEN: &str = "tok-1";

/// Transport that answers every call with a fixed reply and counts calls.
pub struct CountingTransport {
    status: u16,
    body: String,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<WireRequest>>,
}

impl CountingTransport {
    pub fn replying(body: Value) -> Arc<Self> {
        Self::with_status(200, body.to_string())
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers only after `delay` (tokio time, so pausable).
    pub fn delayed(body: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: 200,
            body: body.to_string(),
            delay,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<WireRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(WireResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// Decode a compressed `{"content": ...}` request body.
fn request_content(headers: &HeaderMap, body: &[u8]) -> Value {
    let encoding = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok());
    let raw = decode(body, encoding).unwrap();
    let wrapped: Value = serde_json::from_slice(&raw).unwrap();
    wrapped["content"].clone()
}

async fn login(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let content = request_content(&headers, &body);
    Json(json!({
        "content": {
            "token": ISSUED_TOKEN,
            "user": content["user"],
        }
    }))
}

async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let expected = format!("Bearer {ISSUED_TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => {
            (StatusCode::OK, Json(json!({"content": {"name": "ada"}})))
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": 401, "title": "Unauthorized", "details": "bad token"}})),
        ),
    }
}

async fn echo_query(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({ "content": params }))
}

async fn echo_body(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let encoding = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("identity")
        .to_string();
    Json(json!({
        "content": {
            "encoding": encoding,
            "received": request_content(&headers, &body),
        }
    }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"content": "late"}))
}

async fn bad_gateway() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream unavailable")
}

async fn garbage() -> &'static str {
    "this is not an envelope"
}

/// Start the mock JSON API on an ephemeral port.
pub async fn start_mock_api() -> SocketAddr {
    let app = Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/search", get(echo_query))
        .route("/echo", post(echo_body))
        .route("/slow", get(slow))
        .route("/broken", get(bad_gateway))
        .route("/garbage", get(garbage));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A WebSocket hub that records invoke frames and broadcasts pushes.
pub struct MockHub {
    pub url: String,
    pushes: broadcast::Sender<String>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl MockHub {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (pushes, _) = broadcast::channel::<String>(64);
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let accept_pushes = pushes.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (mut sink, mut source) = socket.split();
                let mut outgoing = accept_pushes.subscribe();
                let frames_tx = frames_tx.clone();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            incoming = source.next() => match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(frame) = serde_json::from_str::<Frame>(text.as_str()) {
                                        let _ = frames_tx.send(frame);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            push = outgoing.recv() => match push {
                                Ok(text) => {
                                    if sink.send(Message::text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}/hub"),
            pushes,
            frames,
        }
    }

    /// Next invoke frame received from any client.
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("no frame from client")
            .expect("hub stopped")
    }

    /// Push `[id, value]` on `event` to every connected client.
    pub fn push(&self, event: &str, id: Value, value: Value) {
        let frame = Frame::Push {
            target: event.to_string(),
            arguments: vec![id, value],
        };
        let _ = self.pushes.send(serde_json::to_string(&frame).unwrap());
    }
}
