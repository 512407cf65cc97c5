//! Caching layer for fast alias lookups.
//!
//! Provides an [`AliasCache`] trait with two implementations:
//! - [`RecencyCache`] - Process-local bounded LRU with periodic flushing
//! - [`NullCache`] - No-op implementation for disabled caching

mod flusher;
mod null_cache;
mod recency_cache;
mod service;

use std::sync::Arc;

use crate::domain::entities::Redirect;

pub use null_cache::NullCache;
pub use recency_cache::RecencyCache;
pub use service::AliasCache;

/// The concrete cache used for redirects.
pub type RedirectCache = RecencyCache<Arc<Redirect>>;

impl AliasCache for RedirectCache {
    fn get_redirect(&self, alias: &str) -> Option<Arc<Redirect>> {
        self.get(alias)
    }

    fn set_redirect(&self, alias: &str, redirect: Arc<Redirect>) {
        self.put(alias, redirect);
    }

    fn invalidate(&self, alias: &str) {
        RecencyCache::invalidate(self, alias);
    }
}
