//! Shared service handles and the visit queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::services::{RedirectService, VisitService};
use crate::application::updater::OptimisticUpdater;
use crate::config::Config;
use crate::domain::repositories::RecordStore;
use crate::domain::visit_event::VisitEvent;
use crate::domain::visit_worker::run_visit_worker;
use crate::infrastructure::cache::{AliasCache, NullCache, RedirectCache};

/// Everything a request path needs, cheap to clone.
pub struct AppState<S: RecordStore + ?Sized> {
    pub redirects: Arc<RedirectService<S>>,
    pub visits: Arc<VisitService<S>>,
    pub visit_tx: mpsc::Sender<VisitEvent>,
}

impl<S: RecordStore + ?Sized> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            redirects: self.redirects.clone(),
            visits: self.visits.clone(),
            visit_tx: self.visit_tx.clone(),
        }
    }
}

impl<S: RecordStore + ?Sized + 'static> AppState<S> {
    /// Wires the services over `store` and starts the visit worker.
    ///
    /// Must be called from within a Tokio runtime. The returned handle finishes
    /// once every clone of the state is dropped and the queue is drained.
    pub fn build(store: Arc<S>, config: &Config) -> (Self, JoinHandle<()>) {
        let cache: Arc<dyn AliasCache> = if !config.cache_enabled {
            info!("Cache disabled (NullCache)");
            Arc::new(NullCache::new())
        } else if let Some(interval) = config.cache_flush_interval() {
            Arc::new(RedirectCache::with_periodic_flush(config.cache_capacity, interval))
        } else {
            info!("Cache enabled without periodic flush");
            Arc::new(RedirectCache::new(config.cache_capacity))
        };

        let updater = OptimisticUpdater::with_policy(store.clone(), config.retry_policy());

        let redirects = RedirectService::new(store.clone(), cache)
            .with_retry_policy(config.retry_policy())
            .with_update_timeout(config.update_timeout())
            .with_random_alias_length(config.random_alias_length);
        let visits = VisitService::new(store, updater).with_update_timeout(config.update_timeout());
        let visits = Arc::new(visits);

        let (visit_tx, visit_rx) = mpsc::channel(config.visit_queue_capacity);
        let worker = tokio::spawn(run_visit_worker(
            visit_rx,
            visits.clone(),
            config.visit_worker_concurrency,
        ));

        let state = Self {
            redirects: Arc::new(redirects),
            visits,
            visit_tx,
        };
        (state, worker)
    }

    /// Queues a visit without waiting. Returns false if it was dropped.
    pub fn track_visit(&self, event: VisitEvent) -> bool {
        match self.visit_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                metrics::counter!("visit_events_dropped_total").increment(1);
                warn!("Visit queue full, dropping visit to {}", event.alias);
                false
            }
            Err(TrySendError::Closed(event)) => {
                metrics::counter!("visit_events_dropped_total").increment(1);
                warn!("Visit worker stopped, dropping visit to {}", event.alias);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::NewRedirect;
    use crate::infrastructure::persistence::InMemoryStore;

    fn config() -> Config {
        Config {
            redis_url: "redis://localhost:6379/0".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            cache_enabled: true,
            cache_capacity: 8,
            cache_flush_interval_seconds: 0,
            update_timeout_seconds: 5,
            update_backoff_ms: 0,
            update_backoff_max_ms: 100,
            random_alias_length: 6,
            visit_queue_capacity: 100,
            visit_worker_concurrency: 2,
        }
    }

    #[tokio::test]
    async fn test_tracked_visits_are_counted() {
        let store = Arc::new(InMemoryStore::new());
        let (state, worker) = AppState::build(store, &config());

        state
            .redirects
            .create(NewRedirect::short("go", "https://go.dev/"))
            .await
            .unwrap();
        let redirect = state.redirects.resolve("go").await.unwrap();
        assert!(state.track_visit(VisitEvent::new(&redirect.alias, "10.0.0.1")));
        assert!(state.track_visit(VisitEvent::new(&redirect.alias, "10.0.0.1")));

        let redirects = state.redirects.clone();
        drop(state);
        worker.await.unwrap();

        let stored = redirects.fetch("go").await.unwrap();
        assert_eq!(stored.pv, 2);
        assert_eq!(stored.uv, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (visit_tx, _visit_rx) = mpsc::channel(1);
        let store = Arc::new(InMemoryStore::new());
        let (state, _worker) = AppState::build(store, &config());
        let state = AppState { visit_tx, ..state };

        assert!(state.track_visit(VisitEvent::new("go", "10.0.0.1")));
        assert!(!state.track_visit(VisitEvent::new("go", "10.0.0.2")));
    }
}
