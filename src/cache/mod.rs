//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! ApiRequest (endpoint, method, payload)
//!     → key.rs (canonical JSON → SHA-256 → "endpoint_METHOD_hash")
//!     → strategy.rs (Disabled / Enabled / EnabledOnDuplicate)
//!     → store.rs (CacheStore: DashMap with absolute expiry)
//! ```
//!
//! # Design Decisions
//! - Eviction is time based only; `MemoryCache` can run a sweeper task
//! - Entries are type-erased envelopes; a type mismatch reads as a miss
//! - Every entry remembers whether it has been observed, which is what
//!   `EnabledOnDuplicate` keys off

pub mod key;
pub mod store;
pub mod strategy;

pub use key::cache_key;
pub use store::{CacheEntry, CacheStore, CachedValue, MemoryCache};
pub use strategy::{ResponseCache, DEFAULT_CACHE_TTL};
