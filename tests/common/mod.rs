#![allow(dead_code)]

use chrono::Utc;
use redirector::application::services::{RedirectService, VisitService};
use redirector::application::updater::OptimisticUpdater;
use redirector::domain::entities::{NewRedirect, Redirect};
use redirector::domain::repositories::RecordStore;
use redirector::infrastructure::cache::{AliasCache, RedirectCache};
use redirector::infrastructure::persistence::InMemoryStore;
use std::sync::Arc;

pub fn memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

pub fn redirect(alias: &str, url: &str) -> Redirect {
    Redirect::new(
        NewRedirect::short(alias, url),
        alias.to_string(),
        url.to_string(),
        Utc::now(),
    )
}

pub async fn seed_redirect<S: RecordStore + ?Sized>(store: &S, alias: &str, url: &str) {
    store
        .create(
            &Redirect::store_key(alias),
            serde_json::to_string(&redirect(alias, url)).unwrap(),
        )
        .await
        .unwrap();
}

pub async fn load_redirect<S: RecordStore + ?Sized>(store: &S, alias: &str) -> Redirect {
    let payload = store.get(&Redirect::store_key(alias)).await.unwrap();
    serde_json::from_str(&payload).unwrap()
}

pub fn redirect_service(
    store: Arc<InMemoryStore>,
    capacity: usize,
) -> (RedirectService<InMemoryStore>, Arc<RedirectCache>) {
    let cache = Arc::new(RedirectCache::new(capacity));
    let service = RedirectService::new(store, cache.clone() as Arc<dyn AliasCache>);
    (service, cache)
}

pub fn visit_service(store: Arc<InMemoryStore>) -> VisitService<InMemoryStore> {
    VisitService::new(store.clone(), OptimisticUpdater::new(store))
}
