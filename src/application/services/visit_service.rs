//! Visit counting with unique visitor tracking.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::application::updater::{Deadline, OptimisticUpdater};
use crate::domain::entities::{ClientTally, Redirect, VisitorRecord};
use crate::domain::repositories::RecordStore;
use crate::domain::visit_event::VisitEvent;
use crate::error::AppError;

use super::redirect_service::DEFAULT_UPDATE_TIMEOUT;

/// Service for recording visits to aliases.
///
/// Each visit bumps the alias's page views. Unique visitors are counted per IP:
/// an IP's visitor record remembers every alias it has been to, and `uv` only
/// grows on the first visit. Referers and user agents are tallied per alias.
pub struct VisitService<S: RecordStore + ?Sized> {
    store: Arc<S>,
    updater: OptimisticUpdater<S>,
    update_timeout: Duration,
}

impl<S: RecordStore + ?Sized> VisitService<S> {
    pub fn new(store: Arc<S>, updater: OptimisticUpdater<S>) -> Self {
        Self {
            store,
            updater,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
        }
    }

    pub fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    /// Records a captured visit: counters first, then the client tally.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_visit`]. A failed tally update is returned after
    /// the counters were already committed.
    pub async fn record_event(&self, event: &VisitEvent) -> Result<bool, AppError> {
        let first_visit = self.record_visit(&event.alias, &event.ip).await?;
        self.record_clients(
            &event.alias,
            event.user_agent.as_deref(),
            event.referer.as_deref(),
        )
        .await?;
        Ok(first_visit)
    }

    /// Records one visit of `ip` to `alias`.
    ///
    /// Returns `true` when this was the IP's first visit to the alias.
    ///
    /// The IP is marked as having visited before the alias counters are
    /// committed. If that second update is canceled the visit is still
    /// remembered for the IP, so the alias's `uv` stays one short.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the alias does not exist. Nothing is
    /// recorded in that case.
    /// Returns [`AppError::Canceled`] if either update runs out of time.
    pub async fn record_visit(&self, alias: &str, ip: &str) -> Result<bool, AppError> {
        let deadline = Deadline::after(self.update_timeout);
        let alias_key = Redirect::store_key(alias);

        self.store
            .get(&alias_key)
            .await
            .map_err(|e| alias_error(e, alias))?;

        let first_visit = self.mark_visitor(alias, ip, deadline).await?;

        let uv = u64::from(first_visit);
        self.updater
            .update(&alias_key, deadline, |mut redirect: Redirect| {
                redirect.count_visit(1, uv, Utc::now());
                Ok(redirect)
            })
            .await
            .map_err(|e| alias_error(e, alias))?;

        debug!("Visit {} from {} (first: {})", alias, ip, first_visit);
        Ok(first_visit)
    }

    /// Adds one visit to the alias's referer and user agent tally.
    pub async fn record_clients(
        &self,
        alias: &str,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Result<(), AppError> {
        let deadline = Deadline::after(self.update_timeout);
        let key = ClientTally::store_key(alias);

        let now = Utc::now();
        let mut tally = ClientTally::empty(alias, now);
        tally.record(user_agent, referer, now);

        match self.store.create(&key, encode(&key, &tally)?).await {
            Ok(()) => return Ok(()),
            Err(AppError::Conflict { .. }) => {}
            Err(e) => return Err(e),
        }

        self.updater
            .update(&key, deadline, |mut tally: ClientTally| {
                tally.record(user_agent, referer, Utc::now());
                Ok(tally)
            })
            .await?;
        Ok(())
    }

    /// Referer and user agent tally for `alias`. Empty if nothing was recorded.
    pub async fn client_stats(&self, alias: &str) -> Result<ClientTally, AppError> {
        let key = ClientTally::store_key(alias);
        match self.store.get(&key).await {
            Ok(payload) => serde_json::from_str(&payload).map_err(|e| {
                AppError::internal(
                    "Corrupted record",
                    json!({ "key": key, "reason": e.to_string() }),
                )
            }),
            Err(e) if e.is_not_found() => Ok(ClientTally::empty(alias, Utc::now())),
            Err(e) => Err(e),
        }
    }

    async fn mark_visitor(&self, alias: &str, ip: &str, deadline: Deadline) -> Result<bool, AppError> {
        let key = VisitorRecord::store_key(ip);

        match self.store.get(&key).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                let record = VisitorRecord::first_visit(ip, alias, Utc::now());
                match self.store.create(&key, encode(&key, &record)?).await {
                    Ok(()) => return Ok(true),
                    // Another request for the same IP created it first.
                    Err(AppError::Conflict { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }

        self.updater
            .read_modify_write(&key, deadline, |mut record: VisitorRecord| {
                let first = record.visit(alias, Utc::now());
                Ok((record, first))
            })
            .await
    }
}

fn alias_error(e: AppError, alias: &str) -> AppError {
    if e.is_not_found() {
        AppError::not_found("Alias not found", json!({ "alias": alias }))
    } else {
        e
    }
}

fn encode<T: serde::Serialize>(key: &str, record: &T) -> Result<String, AppError> {
    serde_json::to_string(record).map_err(|e| {
        AppError::internal(
            "Unable to encode record",
            json!({ "key": key, "reason": e.to_string() }),
        )
    })
}
