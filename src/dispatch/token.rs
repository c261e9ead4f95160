//! Session token storage.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Source of the token sent in the `Authorization` header.
///
/// Concurrent writers race; the last `set_token` wins and every later
/// authorized call uses it, whichever call wrote it.
pub trait TokenProvider: Send + Sync {
    /// Current token; empty tokens read as unset.
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: String);

    fn clear(&self);
}

/// Lock-free token cell.
#[derive(Debug, Default)]
pub struct SharedToken {
    inner: ArcSwapOption<String>,
}

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let shared = Self::new();
        shared.set_token(token.into());
        shared
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner
            .load_full()
            .filter(|token| !token.is_empty())
            .map(|token| token.as_ref().clone())
    }

    fn set_token(&self, token: String) {
        self.inner.store(Some(Arc::new(token)));
    }

    fn clear(&self) {
        self.inner.store(None);
    }
}
