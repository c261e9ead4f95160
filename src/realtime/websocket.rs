//! WebSocket push channel.
//!
//! # Responsibilities
//! - Open the connection to the hub
//! - Serialize `invoke` calls as JSON text frames
//! - Route incoming `push` frames to the listener table
//!
//! # Design Decisions
//! - One writer task fed by an unbounded queue, one reader task
//! - Listeners run on the reader task
//! - Ping/pong handled by tungstenite; no reconnection, a closed socket
//!   fails later `invoke` calls with `ChannelClosed`

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

use crate::realtime::channel::{Frame, ListenerId, ListenerTable, PushChannel, PushHandler, PushMessage};
use crate::realtime::error::RealtimeError;

/// `PushChannel` over a single WebSocket connection.
pub struct WsPushChannel {
    outgoing: mpsc::UnboundedSender<Message>,
    listeners: Arc<ListenerTable>,
    closed: CancellationToken,
}

impl WsPushChannel {
    /// Connect to `url` (`ws://` or `wss://`) and start the I/O tasks.
    pub async fn connect(url: &str) -> Result<Self, RealtimeError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        tracing::info!(url, "Connected to push hub");

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut queue) = mpsc::unbounded_channel::<Message>();
        let listeners = Arc::new(ListenerTable::new());
        let closed = CancellationToken::new();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = queue.recv() => {
                        let Some(message) = next else { break };
                        if let Err(e) = sink.send(message).await {
                            tracing::warn!(error = %e, "Push channel write failed");
                            break;
                        }
                    }
                    _ = writer_closed.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            writer_closed.cancel();
        });

        let reader_closed = closed.clone();
        let reader_listeners = Arc::clone(&listeners);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => handle_text(&reader_listeners, text.as_str()),
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Push hub closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Push channel read failed");
                            break;
                        }
                    },
                    _ = reader_closed.cancelled() => break,
                }
            }
            reader_closed.cancel();
        });

        Ok(Self {
            outgoing,
            listeners,
            closed,
        })
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }
}

fn handle_text(listeners: &ListenerTable, text: &str) {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Push { target, arguments }) => {
            let message = PushMessage::new(target, arguments);
            let delivered = listeners.dispatch(&message);
            tracing::trace!(event = %message.event, delivered, "Push received");
        }
        Ok(Frame::Invoke { target, .. }) => {
            tracing::debug!(method = %target, "Ignoring invoke frame from hub");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed push frame");
        }
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<(), RealtimeError> {
        if self.is_closed() {
            return Err(RealtimeError::ChannelClosed);
        }
        let frame = Frame::Invoke {
            target: method.to_string(),
            arguments,
        };
        let text = serde_json::to_string(&frame)?;
        self.outgoing
            .send(Message::text(text))
            .map_err(|_| RealtimeError::ChannelClosed)?;
        tracing::debug!(method, "Invoked hub method");
        Ok(())
    }

    fn on(&self, event: &str, handler: PushHandler) -> ListenerId {
        self.listeners.add(event, handler)
    }

    fn off(&self, event: &str, id: ListenerId) -> bool {
        self.listeners.remove(event, id)
    }
}

impl Drop for WsPushChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handle_text_routes_push_frames() {
        let table = ListenerTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        table.add(
            "Order_status",
            Arc::new(move |msg: &PushMessage| {
                assert_eq!(msg.value(), Some(&json!("shipped")));
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handle_text(&table, r#"{"type":"push","target":"Order_status","arguments":[1,"shipped"]}"#);
        handle_text(&table, r#"{"type":"invoke","target":"Order_status","arguments":[]}"#);
        handle_text(&table, "not json");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let err = WsPushChannel::connect("ws://127.0.0.1:1/hub").await;
        assert!(matches!(err, Err(RealtimeError::Connect(_))));
    }
}
