//! Background consumer that turns queued visit events into counter updates.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::application::services::VisitService;
use crate::domain::repositories::RecordStore;
use crate::domain::visit_event::VisitEvent;

/// Consumes visit events until every sender is dropped.
///
/// At most `concurrency` visits are recorded at once. A failed visit is logged
/// and dropped. Returns after the in-flight visits have finished.
pub async fn run_visit_worker<S>(
    mut rx: mpsc::Receiver<VisitEvent>,
    service: Arc<VisitService<S>>,
    concurrency: usize,
) where
    S: RecordStore + ?Sized + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    info!("Visit worker started (concurrency: {})", concurrency.max(1));

    while let Some(event) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let service = service.clone();

        tasks.spawn(async move {
            let _permit = permit;
            match service.record_event(&event).await {
                Ok(first) => debug!("Counted visit {} from {} (first: {})", event.alias, event.ip, first),
                Err(e) => warn!(
                    "Dropping visit {} from {}: {} ({})",
                    event.alias,
                    event.ip,
                    e,
                    e.code()
                ),
            }
        });

        // Reap finished tasks so the set stays small.
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    info!("Visit worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::updater::OptimisticUpdater;
    use crate::domain::entities::{NewRedirect, Redirect};
    use crate::infrastructure::persistence::InMemoryStore;
    use chrono::Utc;

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let redirect = Redirect::new(
            NewRedirect::short("go", "https://go.dev/"),
            "go".to_string(),
            "https://go.dev/".to_string(),
            Utc::now(),
        );
        store
            .create(
                &Redirect::store_key("go"),
                serde_json::to_string(&redirect).unwrap(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let store = seeded_store().await;
        let service = Arc::new(VisitService::new(
            store.clone(),
            OptimisticUpdater::new(store.clone()),
        ));
        let (tx, rx) = mpsc::channel(64);
        let worker = tokio::spawn(run_visit_worker(rx, service.clone(), 4));

        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.3"] {
            tx.send(VisitEvent::new("go", ip)).await.unwrap();
        }
        tx.send(
            VisitEvent::new("go", "10.0.0.2")
                .with_client(Some("curl/8.0"), Some("https://example.com/")),
        )
        .await
        .unwrap();
        // Unknown alias is logged and skipped.
        tx.send(VisitEvent::new("missing", "10.0.0.9")).await.unwrap();
        drop(tx);
        worker.await.unwrap();
        let tally = service.client_stats("go").await.unwrap();

        let stored: Redirect =
            serde_json::from_str(&store.get(&Redirect::store_key("go")).await.unwrap()).unwrap();
        assert_eq!(stored.pv, 5);
        assert_eq!(stored.uv, 3);

        assert_eq!(tally.user_agents["curl/8.0"], 1);
        assert_eq!(tally.user_agents["unknown"], 4);
        assert_eq!(tally.top_referers()[0].name, "unknown");
        assert_eq!(tally.referers["https://example.com/"], 1);
        // Visits to the unknown alias leave no tally behind.
        assert!(store.get("redir:clients:missing").await.is_err());
    }
}
