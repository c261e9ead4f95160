//! Cache storage.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;

/// A type-erased cached envelope.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// One cached response.
#[derive(Clone)]
pub struct CacheEntry {
    pub value: CachedValue,
    /// Absolute expiration.
    pub expires_at: Instant,
    /// Whether the key had been observed before.
    pub seen: bool,
}

impl CacheEntry {
    pub fn new(value: CachedValue, ttl: Duration, seen: bool) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
            seen,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("expires_at", &self.expires_at)
            .field("seen", &self.seen)
            .finish()
    }
}

/// Key/value store with absolute expiration, safe for concurrent use.
pub trait CacheStore: Send + Sync {
    /// Look up a live entry and mark it observed.
    ///
    /// The returned entry's `seen` flag is the value it had *before* this
    /// observation. Expired entries are dropped and read as absent.
    fn observe(&self, key: &str) -> Option<CacheEntry>;

    /// Insert or replace an entry atomically.
    fn insert(&self, key: String, entry: CacheEntry);

    fn remove(&self, key: &str) -> bool;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process cache backed by a `DashMap`.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.inner.len(), "Purged expired cache entries");
        }
        metrics::record_cache_size(self.inner.len());
        removed
    }

    /// Purge expired entries every `interval` until `cancel` fires.
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                    _ = cancel.cancelled() => {
                        tracing::debug!("Cache sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

impl CacheStore for MemoryCache {
    fn observe(&self, key: &str) -> Option<CacheEntry> {
        {
            let mut entry = self.inner.get_mut(key)?;
            if !entry.is_expired() {
                let observed = entry.clone();
                entry.seen = true;
                return Some(observed);
            }
        }

        self.inner.remove_if(key, |_, entry| entry.is_expired());
        metrics::record_cache_size(self.inner.len());
        None
    }

    fn insert(&self, key: String, entry: CacheEntry) {
        self.inner.insert(key, entry);
        metrics::record_cache_size(self.inner.len());
    }

    fn remove(&self, key: &str) -> bool {
        let removed = self.inner.remove(key).is_some();
        metrics::record_cache_size(self.inner.len());
        removed
    }

    fn clear(&self) {
        self.inner.clear();
        metrics::record_cache_size(0);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
