//! Realtime update subsystem.
//!
//! # Data Flow
//! ```text
//! ApiResponse<T> (from Dispatcher::send)
//!     → RealtimeHub::attach → LiveResponse<T> (envelope behind a lock)
//!     → subscribe(): RealtimeRegistry lookup (descriptor for T)
//!         → one PushChannel listener per updatable field
//!         → invoke(subscribe_method, "<prefix>_<id>")
//!
//! Push frame {target: "<prefix>_<field>", arguments: [id, value]}
//!     → websocket.rs reader task → ListenerTable::dispatch
//!     → listener: id matches? → write field → FieldChanged broadcast
//! ```
//!
//! # Design Decisions
//! - Per-type metadata is an explicit `RealtimeDescriptor` registered at
//!   startup, not discovered at runtime
//! - Fields are read and written through serde, by wire (camelCase) name
//! - Listeners run on the channel's reader task and take the envelope's
//!   write lock for the duration of one field update
//! - Subscribe is idempotent; listeners are removed on unsubscribe or drop,
//!   and an update already in flight is discarded once unsubscribe returns

pub mod channel;
pub mod descriptor;
pub mod error;
pub mod live;
pub mod websocket;

pub use channel::{Frame, ListenerId, ListenerTable, PushChannel, PushHandler, PushMessage};
pub use descriptor::{RealtimeDescriptor, RealtimeRegistry};
pub use error::RealtimeError;
pub use live::{FieldChanged, LiveResponse, RealtimeHub};
pub use websocket::WsPushChannel;
