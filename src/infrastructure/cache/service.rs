//! Cache seam used by the application services.

use std::sync::Arc;

use crate::domain::entities::Redirect;

/// Trait for caching resolved redirects by alias.
///
/// All operations are in-memory and infallible. A cached record is a
/// non-authoritative copy: callers invalidate after mutating the store.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RecencyCache`] - Bounded LRU cache
/// - [`crate::infrastructure::cache::NullCache`] - No-op implementation for disabled caching
pub trait AliasCache: Send + Sync {
    /// Returns the cached redirect for `alias`, if resident.
    fn get_redirect(&self, alias: &str) -> Option<Arc<Redirect>>;

    /// Caches a redirect under `alias`.
    fn set_redirect(&self, alias: &str, redirect: Arc<Redirect>);

    /// Removes a single alias. Used after the alias was updated or deleted.
    fn invalidate(&self, alias: &str);
}
