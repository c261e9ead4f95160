//! Cache strategy evaluation.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::store::{CacheEntry, CacheStore, MemoryCache};
use crate::observability::metrics;
use crate::request::CacheStrategy;
use crate::response::ApiResponse;

/// Lifetime of a cached response when the request does not set one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Applies a `CacheStrategy` on top of a `CacheStore`.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// A `MemoryCache`-backed cache with the given default TTL.
    pub fn in_memory(default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCache::new()), default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached envelope for `key` if `strategy` allows serving it.
    ///
    /// Hits come back with `is_from_cache` set. Under `EnabledOnDuplicate` an
    /// entry is served only if its key was already observed before this call.
    pub fn get<T>(&self, key: &str, strategy: CacheStrategy) -> Option<ApiResponse<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !strategy.is_enabled() {
            return None;
        }

        let Some(entry) = self.store.observe(key) else {
            metrics::record_cache_lookup("miss");
            return None;
        };

        if strategy == CacheStrategy::EnabledOnDuplicate && !entry.seen {
            tracing::debug!(key, "First observation of cached key, not a duplicate yet");
            metrics::record_cache_lookup("unconfirmed");
            return None;
        }

        match entry.value.downcast_ref::<ApiResponse<T>>() {
            Some(cached) => {
                metrics::record_cache_lookup("hit");
                let mut hit = cached.clone();
                hit.is_from_cache = true;
                Some(hit)
            }
            None => {
                tracing::warn!(key, "Cached entry holds a different response type, ignoring");
                metrics::record_cache_lookup("type_mismatch");
                None
            }
        }
    }

    /// Store `envelope` under `key`.
    ///
    /// No-op under `Disabled` or when there is no envelope. The storing call
    /// counts as the key's first observation.
    pub fn set<T>(
        &self,
        key: &str,
        envelope: Option<&ApiResponse<T>>,
        strategy: CacheStrategy,
        ttl: Option<Duration>,
    ) where
        T: Clone + Send + Sync + 'static,
    {
        if !strategy.is_enabled() {
            return;
        }
        let Some(envelope) = envelope else {
            return;
        };

        let mut stored = envelope.clone();
        stored.is_from_cache = false;
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.store
            .insert(key.to_string(), CacheEntry::new(Arc::new(stored), ttl, true));
        tracing::debug!(key, ttl_ms = ttl.as_millis() as u64, "Cached response");
    }

    /// Insert an envelope that no call has observed yet.
    ///
    /// `Enabled` lookups serve it immediately; `EnabledOnDuplicate` lookups
    /// serve it from the second lookup on.
    pub fn prime<T>(&self, key: &str, envelope: ApiResponse<T>, ttl: Option<Duration>)
    where
        T: Send + Sync + 'static,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.store
            .insert(key.to_string(), CacheEntry::new(Arc::new(envelope), ttl, false));
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.store.remove(key)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::in_memory(DEFAULT_CACHE_TTL)
    }
}
