//! No-op cache implementation for disabled caching.

use std::sync::Arc;

use super::service::AliasCache;
use crate::domain::entities::Redirect;
use tracing::debug;

/// A cache implementation that does nothing.
///
/// Every lookup misses, so each resolve goes to the store. Used when
/// `CACHE_ENABLED=false`.
pub struct NullCache;

impl NullCache {
    /// Creates a new NullCache instance.
    pub fn new() -> Self {
        debug!("Using NullCache (caching disabled)");
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasCache for NullCache {
    fn get_redirect(&self, _alias: &str) -> Option<Arc<Redirect>> {
        None
    }

    fn set_redirect(&self, _alias: &str, _redirect: Arc<Redirect>) {}

    fn invalidate(&self, _alias: &str) {}
}
