//! Push channel abstraction and listener bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::realtime::error::RealtimeError;

/// A JSON text frame exchanged with the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client to hub: call a named remote method.
    Invoke { target: String, arguments: Vec<Value> },
    /// Hub to client: a named event, arguments are `[id, value]`.
    Push { target: String, arguments: Vec<Value> },
}

/// An incoming push, as handed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub event: String,
    pub arguments: Vec<Value>,
}

impl PushMessage {
    pub fn new(event: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            arguments,
        }
    }

    /// Identifier of the entity the push is about.
    pub fn entity_id(&self) -> Option<&Value> {
        self.arguments.first()
    }

    /// The field's new value.
    pub fn value(&self) -> Option<&Value> {
        self.arguments.get(1)
    }
}

pub type PushHandler = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Handle for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A persistent bidirectional channel to the push hub.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Fire a named remote call.
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<(), RealtimeError>;

    /// Register `handler` for pushes named `event`.
    fn on(&self, event: &str, handler: PushHandler) -> ListenerId;

    /// Remove one listener. Returns false if it was not registered.
    fn off(&self, event: &str, id: ListenerId) -> bool;
}

/// Listeners keyed by event name.
///
/// Several listeners may share an event; each is removed individually.
#[derive(Default)]
pub struct ListenerTable {
    next_id: AtomicU64,
    listeners: DashMap<String, Vec<(ListenerId, PushHandler)>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, handler: PushHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn remove(&self, event: &str, id: ListenerId) -> bool {
        let mut removed = false;
        if let Some(mut handlers) = self.listeners.get_mut(event) {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed = handlers.len() != before;
        }
        self.listeners.remove_if(event, |_, handlers| handlers.is_empty());
        removed
    }

    /// Run every listener registered for `message.event`.
    ///
    /// Handlers are called after the table lock is released, so a handler
    /// may register or remove listeners. Returns how many ran.
    pub fn dispatch(&self, message: &PushMessage) -> usize {
        let handlers: Vec<PushHandler> = match self.listeners.get(&message.event) {
            Some(entries) => entries.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    /// Listeners registered for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
