//! Record store interface with an optimistic concurrency primitive.

use crate::error::AppError;
use async_trait::async_trait;

/// Opaque marker of a record's state at read time.
///
/// Only meaningful when handed back to [`RecordStore::commit_if_unchanged`] for
/// the same key it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionToken(u64);

impl VersionToken {
    pub fn new(revision: u64) -> Self {
        Self(revision)
    }

    pub fn revision(self) -> u64 {
        self.0
    }
}

/// A payload together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub payload: String,
    pub version: VersionToken,
}

/// Key/value record store.
///
/// Keys are namespaced strings such as `redir:alias:go`. Payloads are JSON.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::RedisStore`]
/// - [`crate::infrastructure::persistence::InMemoryStore`]
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point read.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the key does not exist.
    /// Returns [`AppError::Unavailable`] on transport failures.
    async fn get(&self, key: &str) -> Result<String, AppError>;

    /// Creates a record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if the key already exists.
    async fn create(&self, key: &str, payload: String) -> Result<(), AppError>;

    /// Unconditionally overwrites an existing record.
    ///
    /// Not for contended data: use the optimistic path for anything that
    /// concurrent writers also touch.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the key does not exist.
    async fn update(&self, key: &str, payload: String) -> Result<(), AppError>;

    /// Deletes a record. Returns `Ok(false)` if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Reads a record together with its current version.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the key does not exist.
    async fn read_for_update(&self, key: &str) -> Result<Versioned, AppError>;

    /// Writes `payload` only if the record is still at `version`.
    ///
    /// Returns `Ok(false)` when another writer committed first (version conflict)
    /// or the record was deleted in between. Among racing commits at the same
    /// version exactly one returns `Ok(true)`.
    async fn commit_if_unchanged(
        &self,
        key: &str,
        version: VersionToken,
        payload: String,
    ) -> Result<bool, AppError>;

    /// Lists keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, AppError>;

    /// Checks if the store backend is reachable.
    async fn health_check(&self) -> bool;
}
