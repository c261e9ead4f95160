//! Live responses: envelopes kept in sync with pushed field changes.

use std::any::type_name;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::config::RealtimeConfig;
use crate::observability::metrics;
use crate::realtime::channel::{ListenerId, PushChannel, PushHandler, PushMessage};
use crate::realtime::descriptor::{id_string, read_field, write_field, RealtimeRegistry};
use crate::realtime::error::RealtimeError;
use crate::realtime::websocket::WsPushChannel;
use crate::response::ApiResponse;

const CHANGE_BUFFER: usize = 64;

/// Notification raised after a pushed value was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChanged {
    pub field: String,
    pub value: Value,
}

/// Shared push channel plus the descriptors of every live type.
#[derive(Clone)]
pub struct RealtimeHub {
    channel: Arc<dyn PushChannel>,
    registry: Arc<RealtimeRegistry>,
}

impl RealtimeHub {
    pub fn new(channel: Arc<dyn PushChannel>, registry: Arc<RealtimeRegistry>) -> Self {
        Self { channel, registry }
    }

    /// Open a WebSocket channel to the configured hub.
    pub async fn connect(config: &RealtimeConfig, registry: Arc<RealtimeRegistry>) -> Result<Self, RealtimeError> {
        let url = config
            .hub_url
            .as_deref()
            .ok_or_else(|| RealtimeError::Configuration("realtime.hub_url is not set".to_string()))?;
        if !config.enabled {
            return Err(RealtimeError::Configuration("realtime.enabled is false".to_string()));
        }
        let channel = WsPushChannel::connect(url).await?;
        Ok(Self::new(Arc::new(channel), registry))
    }

    pub fn registry(&self) -> &RealtimeRegistry {
        &self.registry
    }

    /// Wrap `envelope` so it can follow pushed updates. Starts unbound.
    pub fn attach<T>(&self, envelope: ApiResponse<T>) -> LiveResponse<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        LiveResponse {
            envelope: Arc::new(RwLock::new(envelope)),
            channel: Arc::clone(&self.channel),
            registry: Arc::clone(&self.registry),
            changes,
            binding: Mutex::new(Binding::Unbound),
        }
    }
}

enum Binding {
    Unbound,
    Subscribed {
        group: String,
        unsubscribe_method: String,
        listeners: Vec<(String, ListenerId)>,
        /// Checked by listeners under the envelope write lock.
        active: Arc<AtomicBool>,
    },
}

/// An `ApiResponse<T>` whose content may be updated by the push hub.
///
/// Updates are applied on the channel's task; read through `snapshot` or
/// `read` and follow them through `changes`.
pub struct LiveResponse<T> {
    envelope: Arc<RwLock<ApiResponse<T>>>,
    channel: Arc<dyn PushChannel>,
    registry: Arc<RealtimeRegistry>,
    changes: broadcast::Sender<FieldChanged>,
    binding: Mutex<Binding>,
}

impl<T> LiveResponse<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Start following pushes for this envelope's entity.
    ///
    /// Fails with `Configuration` when `T` has no descriptor or the content
    /// carries no identifier. No-op when already subscribed.
    pub async fn subscribe(&self) -> Result<(), RealtimeError> {
        let mut binding = self.binding.lock().await;
        if matches!(*binding, Binding::Subscribed { .. }) {
            return Ok(());
        }

        let descriptor = self.registry.get::<T>().ok_or_else(|| {
            RealtimeError::Configuration(format!("no realtime descriptor for {}", type_name::<T>()))
        })?;

        let id = {
            let envelope = self.envelope.read().unwrap_or_else(PoisonError::into_inner);
            let content = envelope.content.as_ref().ok_or_else(|| {
                RealtimeError::Configuration("response has no content to subscribe".to_string())
            })?;
            read_field(content, &descriptor.id_field)?
                .as_ref()
                .and_then(id_string)
                .ok_or_else(|| {
                    RealtimeError::Configuration(format!(
                        "identifier field '{}' has no value",
                        descriptor.id_field
                    ))
                })?
        };

        let active = Arc::new(AtomicBool::new(true));
        let listeners: Vec<(String, ListenerId)> = descriptor
            .fields
            .iter()
            .map(|field| {
                let event = descriptor.event_name(field);
                let listener = self.channel.on(&event, self.field_listener(field, &id, &active));
                (event, listener)
            })
            .collect();

        let group = descriptor.group_name(&id);
        let invoked = self
            .channel
            .invoke(&descriptor.subscribe_method, vec![Value::String(group.clone())])
            .await;
        if let Err(e) = invoked {
            self.deactivate(&active);
            for (event, listener) in &listeners {
                self.channel.off(event, *listener);
            }
            return Err(e);
        }

        tracing::info!(group = %group, fields = listeners.len(), "Subscribed to realtime updates");
        metrics::record_subscription_change(1.0);
        *binding = Binding::Subscribed {
            group,
            unsubscribe_method: descriptor.unsubscribe_method.clone(),
            listeners,
            active,
        };
        Ok(())
    }

    /// Stop following pushes. No-op when not subscribed.
    pub async fn unsubscribe(&self) -> Result<(), RealtimeError> {
        let mut binding = self.binding.lock().await;
        let Binding::Subscribed {
            group,
            unsubscribe_method,
            listeners,
            active,
        } = std::mem::replace(&mut *binding, Binding::Unbound)
        else {
            return Ok(());
        };

        self.deactivate(&active);
        for (event, listener) in &listeners {
            self.channel.off(event, *listener);
        }
        metrics::record_subscription_change(-1.0);
        tracing::info!(group = %group, "Unsubscribed from realtime updates");
        self.channel
            .invoke(&unsubscribe_method, vec![Value::String(group)])
            .await
    }

    fn field_listener(&self, field: &str, id: &str, active: &Arc<AtomicBool>) -> PushHandler {
        let envelope = Arc::clone(&self.envelope);
        let active = Arc::clone(active);
        let changes = self.changes.clone();
        let field = field.to_string();
        let id = id.to_string();

        Arc::new(move |message: &PushMessage| {
            if message.entity_id().and_then(id_string).as_deref() != Some(id.as_str()) {
                return;
            }
            let value = message.value().cloned().unwrap_or(Value::Null);

            // The notification goes out before the lock is released, so
            // nothing is applied or announced once deactivate() returns.
            let mut guard = envelope.write().unwrap_or_else(PoisonError::into_inner);
            if !active.load(Ordering::Acquire) {
                return;
            }
            let applied = match guard.content.as_mut() {
                Some(content) => write_field(content, &field, value.clone()),
                None => Err(RealtimeError::Protocol("envelope lost its content".to_string())),
            };

            match applied {
                Ok(()) => {
                    metrics::record_realtime_update(&field);
                    tracing::debug!(field = %field, id = %id, "Applied realtime update");
                    let _ = changes.send(FieldChanged {
                        field: field.clone(),
                        value,
                    });
                }
                Err(e) => {
                    tracing::warn!(field = %field, id = %id, error = %e, "Dropped realtime update");
                }
            }
            drop(guard);
        })
    }
}

impl<T> LiveResponse<T> {
    /// Stop this subscription's listeners from applying anything further.
    ///
    /// Waits for a listener that is mid-update to finish.
    fn deactivate(&self, active: &AtomicBool) {
        let _guard = self.envelope.write().unwrap_or_else(PoisonError::into_inner);
        active.store(false, Ordering::Release);
    }

    /// Run `f` against the current envelope.
    pub fn read<R>(&self, f: impl FnOnce(&ApiResponse<T>) -> R) -> R {
        let envelope = self.envelope.read().unwrap_or_else(PoisonError::into_inner);
        f(&envelope)
    }

    pub fn snapshot(&self) -> ApiResponse<T>
    where
        T: Clone,
    {
        self.read(Clone::clone)
    }

    /// Receiver of every change applied after this call.
    pub fn changes(&self) -> broadcast::Receiver<FieldChanged> {
        self.changes.subscribe()
    }

    pub async fn is_subscribed(&self) -> bool {
        matches!(*self.binding.lock().await, Binding::Subscribed { .. })
    }
}

impl<T> Drop for LiveResponse<T> {
    fn drop(&mut self) {
        let Binding::Subscribed {
            group,
            unsubscribe_method,
            listeners,
            active,
        } = std::mem::replace(self.binding.get_mut(), Binding::Unbound)
        else {
            return;
        };

        self.deactivate(&active);
        for (event, listener) in &listeners {
            self.channel.off(event, *listener);
        }
        metrics::record_subscription_change(-1.0);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&self.channel);
            runtime.spawn(async move {
                if let Err(e) = channel
                    .invoke(&unsubscribe_method, vec![Value::String(group)])
                    .await
                {
                    tracing::debug!(error = %e, "Unsubscribe on drop failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::channel::ListenerTable;
    use crate::realtime::descriptor::RealtimeDescriptor;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Order {
        order_id: u64,
        status: String,
        note: Option<String>,
    }

    #[derive(Default)]
    struct FakeChannel {
        listeners: ListenerTable,
        invoked: StdMutex<Vec<(String, Vec<Value>)>>,
        fail_invoke: bool,
    }

    impl FakeChannel {
        fn push(&self, event: &str, id: Value, value: Value) -> usize {
            self.listeners.dispatch(&PushMessage::new(event, vec![id, value]))
        }

        fn invoked(&self) -> Vec<(String, Vec<Value>)> {
            self.invoked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushChannel for FakeChannel {
        async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<(), RealtimeError> {
            if self.fail_invoke {
                return Err(RealtimeError::ChannelClosed);
            }
            self.invoked.lock().unwrap().push((method.to_string(), arguments));
            Ok(())
        }

        fn on(&self, event: &str, handler: PushHandler) -> ListenerId {
            self.listeners.add(event, handler)
        }

        fn off(&self, event: &str, id: ListenerId) -> bool {
            self.listeners.remove(event, id)
        }
    }

    fn registry() -> Arc<RealtimeRegistry> {
        let registry = RealtimeRegistry::new();
        registry
            .register::<Order>(
                RealtimeDescriptor::new("Order", "SubscribeToGroup", "UnsubscribeFromGroup")
                    .with_id_field("orderId")
                    .with_field("status")
                    .with_field("note"),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn order(id: u64) -> ApiResponse<Order> {
        ApiResponse::success(Order {
            order_id: id,
            status: "open".into(),
            note: None,
        })
    }

    fn hub(channel: &Arc<FakeChannel>) -> RealtimeHub {
        RealtimeHub::new(Arc::clone(channel) as Arc<dyn PushChannel>, registry())
    }

    #[tokio::test]
    async fn test_subscribe_registers_listeners_then_invokes() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        assert!(!live.is_subscribed().await);

        live.subscribe().await.unwrap();
        assert!(live.is_subscribed().await);
        assert_eq!(channel.listeners.count("Order_status"), 1);
        assert_eq!(channel.listeners.count("Order_note"), 1);
        assert_eq!(
            channel.invoked(),
            vec![("SubscribeToGroup".to_string(), vec![json!("Order_42")])]
        );
    }

    #[tokio::test]
    async fn test_matching_push_updates_one_field_once() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        let mut changes = live.changes();
        live.subscribe().await.unwrap();

        channel.push("Order_status", json!(42), json!("shipped"));

        let snapshot = live.snapshot().content.unwrap();
        assert_eq!(snapshot.status, "shipped");
        assert_eq!(snapshot.note, None);
        assert_eq!(
            changes.try_recv().unwrap(),
            FieldChanged {
                field: "status".into(),
                value: json!("shipped"),
            }
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_other_entity_is_ignored() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        let mut changes = live.changes();
        live.subscribe().await.unwrap();

        channel.push("Order_status", json!(7), json!("shipped"));
        assert_eq!(live.read(|e| e.content.as_ref().unwrap().status.clone()), "open");
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        let mut changes = live.changes();
        live.subscribe().await.unwrap();
        live.subscribe().await.unwrap();

        assert_eq!(channel.listeners.count("Order_status"), 1);
        assert_eq!(channel.invoked().len(), 1);

        channel.push("Order_status", json!(42), json!("shipped"));
        assert!(changes.try_recv().is_ok());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_updates_and_allows_resubscribe() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        live.subscribe().await.unwrap();
        live.unsubscribe().await.unwrap();

        assert!(!live.is_subscribed().await);
        assert!(channel.listeners.is_empty());
        assert_eq!(
            channel.invoked()[1],
            ("UnsubscribeFromGroup".to_string(), vec![json!("Order_42")])
        );

        assert_eq!(channel.push("Order_status", json!(42), json!("shipped")), 0);
        assert_eq!(live.snapshot().content.unwrap().status, "open");

        live.unsubscribe().await.unwrap();
        assert_eq!(channel.invoked().len(), 2);

        live.subscribe().await.unwrap();
        assert!(live.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_missing_descriptor_or_id_is_a_configuration_error() {
        let channel = Arc::new(FakeChannel::default());
        let plain = hub(&channel).attach(ApiResponse::success("text".to_string()));
        assert!(matches!(
            plain.subscribe().await,
            Err(RealtimeError::Configuration(_))
        ));

        let empty = hub(&channel).attach(ApiResponse::<Order>::default());
        assert!(matches!(
            empty.subscribe().await,
            Err(RealtimeError::Configuration(_))
        ));
        assert!(channel.listeners.is_empty());
        assert!(channel.invoked().is_empty());
    }

    #[tokio::test]
    async fn test_failed_invoke_rolls_back_listeners() {
        let channel = Arc::new(FakeChannel {
            fail_invoke: true,
            ..FakeChannel::default()
        });
        let live = hub(&channel).attach(order(42));
        assert!(matches!(
            live.subscribe().await,
            Err(RealtimeError::ChannelClosed)
        ));
        assert!(!live.is_subscribed().await);
        assert!(channel.listeners.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_value_is_dropped() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        let mut changes = live.changes();
        live.subscribe().await.unwrap();

        channel.push("Order_status", json!(42), json!(17));
        assert_eq!(live.snapshot().content.unwrap().status, "open");
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_removes_listeners() {
        let channel = Arc::new(FakeChannel::default());
        {
            let live = hub(&channel).attach(order(42));
            live.subscribe().await.unwrap();
        }
        assert!(channel.listeners.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_update_in_flight_does_not_land_after_unsubscribe() {
        let channel = Arc::new(FakeChannel::default());
        let live = Arc::new(hub(&channel).attach(order(42)));
        let mut changes = live.changes();
        live.subscribe().await.unwrap();

        // Park the listener on the envelope lock.
        let reader = live.envelope.read().unwrap();
        let pusher = {
            let channel = Arc::clone(&channel);
            std::thread::spawn(move || channel.push("Order_status", json!(42), json!("shipped")))
        };
        std::thread::sleep(Duration::from_millis(50));

        let unsubscribing = {
            let live = Arc::clone(&live);
            tokio::spawn(async move { live.unsubscribe().await })
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(reader);

        unsubscribing.await.unwrap().unwrap();
        assert!(!live.is_subscribed().await);
        let status_at_return = live.snapshot().content.unwrap().status;
        let mut announced = 0;
        while changes.try_recv().is_ok() {
            announced += 1;
        }

        pusher.join().unwrap();
        assert_eq!(live.snapshot().content.unwrap().status, status_at_return);
        assert!(changes.try_recv().is_err());
        assert_eq!(announced, usize::from(status_at_return == "shipped"));
    }

    #[tokio::test]
    async fn test_push_after_deactivation_is_ignored() {
        let channel = Arc::new(FakeChannel::default());
        let live = hub(&channel).attach(order(42));
        let mut changes = live.changes();
        live.subscribe().await.unwrap();

        // A listener that outlived its subscription, as when dispatch copied it
        // out of the table just before unsubscribe.
        let stale = {
            let binding = live.binding.lock().await;
            let Binding::Subscribed { active, .. } = &*binding else {
                panic!("not subscribed");
            };
            live.field_listener("status", "42", active)
        };
        live.unsubscribe().await.unwrap();

        stale(&PushMessage::new("Order_status", vec![json!(42), json!("shipped")]));
        assert_eq!(live.snapshot().content.unwrap().status, "open");
        assert!(changes.try_recv().is_err());
    }
}
