//! Optimistic read-modify-write against a [`RecordStore`].
//!
//! # Protocol
//!
//! ```text
//!   loop:
//!     deadline passed?         -> Canceled
//!     read (payload, version)  -- bounded by the deadline
//!     f(old) -> new            -- error: return it, no retry
//!     deadline passed?         -> Canceled
//!     commit_if_unchanged      -- Ok(true): done, Ok(false): conflict, retry
//! ```
//!
//! No lock is held across the network round trips. Commits to the same key are
//! linearized by the store's conditional write, so no committed effect is lost.
//! Nothing is guaranteed about the order of concurrent updates beyond that: the
//! transformation must carry forward every field it does not intend to change.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::debug;

use crate::domain::repositories::RecordStore;
use crate::error::AppError;

/// Stand-in for "no deadline" when a timeout does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Absolute point in time after which an update stops retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Deadline `timeout` from now. Timeouts too large to represent are
    /// clamped to roughly thirty years.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(
            now.checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
        )
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// What to do between a version conflict and the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry right away.
    #[default]
    Immediate,
    /// Exponential backoff with jitter: roughly `2^n * factor`, capped at `max_delay`.
    Backoff { factor: Duration, max_delay: Duration },
}

impl RetryPolicy {
    /// Builds a policy from millisecond settings; `factor_ms == 0` means immediate.
    pub fn from_millis(factor_ms: u64, max_delay_ms: u64) -> Self {
        if factor_ms == 0 {
            return Self::Immediate;
        }
        Self::Backoff {
            factor: Duration::from_millis(factor_ms),
            max_delay: Duration::from_millis(max_delay_ms.max(factor_ms)),
        }
    }

    fn delays(&self) -> Option<impl Iterator<Item = Duration>> {
        match *self {
            RetryPolicy::Immediate => None,
            RetryPolicy::Backoff { factor, max_delay } => {
                let factor_ms = u64::try_from(factor.as_millis()).unwrap_or(u64::MAX);
                Some(
                    ExponentialBackoff::from_millis(2)
                        .factor(factor_ms)
                        .max_delay(max_delay)
                        .map(jitter),
                )
            }
        }
    }
}

/// Stateless compare-and-retry executor.
pub struct OptimisticUpdater<S: RecordStore + ?Sized> {
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S: RecordStore + ?Sized> Clone for OptimisticUpdater<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
        }
    }
}

impl<S: RecordStore + ?Sized> OptimisticUpdater<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            policy: RetryPolicy::Immediate,
        }
    }

    pub fn with_policy(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `f` against the current record at `key` and commits the result if no
    /// one else wrote in between, retrying on conflict until `deadline`.
    ///
    /// `f` receives the decoded record and returns the new record plus an outcome
    /// value. The outcome of the attempt that committed is returned. `f` may run
    /// several times and must not have side effects.
    ///
    /// # Errors
    ///
    /// - [`AppError::Canceled`] if the deadline passes before a commit succeeds
    /// - whatever `f` returns, immediately and without retry
    /// - [`AppError::NotFound`] / [`AppError::Unavailable`] from the store, without retry
    /// - [`AppError::Internal`] if the stored payload cannot be decoded
    pub async fn read_modify_write<T, R, F>(
        &self,
        key: &str,
        deadline: Deadline,
        mut f: F,
    ) -> Result<R, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> Result<(T, R), AppError>,
    {
        let mut backoff = self.policy.delays();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if deadline.is_expired() {
                return Err(canceled(key, attempt - 1));
            }

            let current = timeout_at(deadline.instant(), self.store.read_for_update(key))
                .await
                .map_err(|_| canceled(key, attempt - 1))??;

            let old: T = serde_json::from_str(&current.payload).map_err(|e| {
                AppError::internal(
                    "Corrupted record",
                    json!({ "key": key, "reason": e.to_string() }),
                )
            })?;

            let (new, outcome) = f(old)?;

            let payload = serde_json::to_string(&new).map_err(|e| {
                AppError::internal(
                    "Unable to encode record",
                    json!({ "key": key, "reason": e.to_string() }),
                )
            })?;

            if deadline.is_expired() {
                return Err(canceled(key, attempt));
            }

            if self
                .store
                .commit_if_unchanged(key, current.version, payload)
                .await?
            {
                if attempt > 1 {
                    debug!("Update of {} committed after {} attempts", key, attempt);
                }
                return Ok(outcome);
            }

            metrics::counter!("store_update_conflicts_total").increment(1);
            debug!("Version conflict on {} (attempt {})", key, attempt);

            if let Some(delay) = backoff.as_mut().and_then(|delays| delays.next()) {
                let wake = (Instant::now() + delay).min(deadline.instant());
                sleep_until(wake).await;
            }
        }
    }

    /// Convenience form of [`Self::read_modify_write`] that returns the committed record.
    pub async fn update<T, F>(&self, key: &str, deadline: Deadline, mut f: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnMut(T) -> Result<T, AppError>,
    {
        self.read_modify_write(key, deadline, |old: T| {
            let new = f(old)?;
            Ok((new.clone(), new))
        })
        .await
    }
}

fn canceled(key: &str, attempts: u32) -> AppError {
    metrics::counter!("store_update_canceled_total").increment(1);
    AppError::canceled(
        "Update canceled before commit",
        json!({ "key": key, "attempts": attempts }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{MockRecordStore, VersionToken, Versioned};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        n: u64,
    }

    fn versioned(n: u64, rev: u64) -> Versioned {
        Versioned {
            payload: serde_json::to_string(&Counter { n }).unwrap(),
            version: VersionToken::new(rev),
        }
    }

    fn increment(c: Counter) -> Result<Counter, AppError> {
        Ok(Counter { n: c.n + 1 })
    }

    #[tokio::test]
    async fn test_deadline_after_huge_timeout_saturates() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));

        assert!(!deadline.is_expired());
        assert!(deadline.instant() > Instant::now() + Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_commits_on_first_attempt() {
        let mut store = MockRecordStore::new();
        store
            .expect_read_for_update()
            .times(1)
            .returning(|_| Ok(versioned(4, 7)));
        store
            .expect_commit_if_unchanged()
            .withf(|key, version, payload| {
                key == "k" && version.revision() == 7 && payload == r#"{"n":5}"#
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let updater = OptimisticUpdater::new(Arc::new(store));
        let result = updater
            .update("k", Deadline::after(Duration::from_secs(1)), increment)
            .await
            .unwrap();

        assert_eq!(result, Counter { n: 5 });
    }

    #[tokio::test]
    async fn test_retries_whole_cycle_on_conflict() {
        let mut store = MockRecordStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_read_for_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(versioned(1, 1)));
        store
            .expect_commit_if_unchanged()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(false));
        store
            .expect_read_for_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(versioned(2, 2)));
        store
            .expect_commit_if_unchanged()
            .withf(|_, version, payload| version.revision() == 2 && payload == r#"{"n":3}"#)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));

        let updater = OptimisticUpdater::new(Arc::new(store));
        let mut calls = 0;
        let result = updater
            .update("k", Deadline::after(Duration::from_secs(1)), |c: Counter| {
                calls += 1;
                increment(c)
            })
            .await
            .unwrap();

        assert_eq!(result.n, 3);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_transform_error_is_not_retried() {
        let mut store = MockRecordStore::new();
        store
            .expect_read_for_update()
            .times(1)
            .returning(|_| Ok(versioned(1, 1)));
        store.expect_commit_if_unchanged().times(0);

        let updater = OptimisticUpdater::new(Arc::new(store));
        let err = updater
            .update("k", Deadline::after(Duration::from_secs(1)), |_: Counter| {
                Err(AppError::bad_request("rejected", json!({})))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_on_read_is_not_retried() {
        let mut store = MockRecordStore::new();
        store
            .expect_read_for_update()
            .times(1)
            .returning(|_| Err(AppError::unavailable("down", json!({}))));
        store.expect_commit_if_unchanged().times(0);

        let updater = OptimisticUpdater::new(Arc::new(store));
        let err = updater
            .update("k", Deadline::after(Duration::from_secs(1)), increment)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_on_commit_is_not_retried() {
        let mut store = MockRecordStore::new();
        store
            .expect_read_for_update()
            .times(1)
            .returning(|_| Ok(versioned(1, 1)));
        store
            .expect_commit_if_unchanged()
            .times(1)
            .returning(|_, _, _| Err(AppError::unavailable("down", json!({}))));

        let updater = OptimisticUpdater::new(Arc::new(store));
        let err = updater
            .update("k", Deadline::after(Duration::from_secs(1)), increment)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_record_propagates_not_found() {
        let mut store = MockRecordStore::new();
        store
            .expect_read_for_update()
            .times(1)
            .returning(|key| Err(AppError::not_found("missing", json!({ "key": key }))));

        let updater = OptimisticUpdater::new(Arc::new(store));
        let err = updater
            .update("k", Deadline::after(Duration::from_secs(1)), increment)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_corrupted_payload_is_internal() {
        let mut store = MockRecordStore::new();
        store.expect_read_for_update().times(1).returning(|_| {
            Ok(Versioned {
                payload: "not json".to_string(),
                version: VersionToken::new(0),
            })
        });
        store.expect_commit_if_unchanged().times(0);

        let updater = OptimisticUpdater::new(Arc::new(store));
        let err = updater
            .update("k", Deadline::after(Duration::from_secs(1)), increment)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_expired_deadline_touches_nothing() {
        let mut store = MockRecordStore::new();
        store.expect_read_for_update().times(0);
        store.expect_commit_if_unchanged().times(0);

        let updater = OptimisticUpdater::new(Arc::new(store));
        let err = updater
            .update("k", Deadline::at(Instant::now()), increment)
            .await
            .unwrap_err();

        assert!(err.is_canceled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_is_capped_by_deadline() {
        let mut store = MockRecordStore::new();
        store
            .expect_read_for_update()
            .returning(|_| Ok(versioned(1, 1)));
        store
            .expect_commit_if_unchanged()
            .returning(|_, _, _| Ok(false));

        let policy = RetryPolicy::Backoff {
            factor: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
        };
        let updater = OptimisticUpdater::with_policy(Arc::new(store), policy);

        let start = Instant::now();
        let err = updater
            .update("k", Deadline::after(Duration::from_secs(5)), increment)
            .await
            .unwrap_err();

        assert!(err.is_canceled());
        assert!(Instant::now() - start <= Duration::from_secs(6));
    }

    #[test]
    fn test_policy_from_millis() {
        assert_eq!(RetryPolicy::from_millis(0, 100), RetryPolicy::Immediate);
        assert_eq!(
            RetryPolicy::from_millis(5, 1),
            RetryPolicy::Backoff {
                factor: Duration::from_millis(5),
                max_delay: Duration::from_millis(5),
            }
        );
    }
}
