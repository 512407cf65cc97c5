//! Process-local record store.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::repositories::{RecordStore, VersionToken, Versioned};
use crate::error::AppError;

#[derive(Debug, Clone)]
struct Slot {
    payload: String,
    revision: u64,
}

#[derive(Debug, Default)]
struct Records {
    slots: HashMap<String, Slot>,
    clock: u64,
}

impl Records {
    /// Next store-wide revision. Never handed out twice, even across a
    /// delete and re-create of the same key.
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// In-memory [`RecordStore`] with the same revision semantics as [`super::RedisStore`].
///
/// Every successful write stamps the key with a fresh revision from a
/// store-wide clock, so a token obtained from [`RecordStore::read_for_update`]
/// goes stale as soon as anyone else writes, deletes or re-creates the key.
/// Used by tests and for embedding without a Redis server.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<Records>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Current revision of a key, if present.
    pub fn revision(&self, key: &str) -> Option<u64> {
        self.lock().slots.get(key).map(|slot| slot.revision)
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing(key: &str) -> AppError {
    AppError::not_found("Record not found", json!({ "key": key }))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<String, AppError> {
        self.lock()
            .slots
            .get(key)
            .map(|slot| slot.payload.clone())
            .ok_or_else(|| missing(key))
    }

    async fn create(&self, key: &str, payload: String) -> Result<(), AppError> {
        let mut records = self.lock();
        if records.slots.contains_key(key) {
            return Err(AppError::conflict(
                "Record already exists",
                json!({ "key": key }),
            ));
        }
        let revision = records.tick();
        records
            .slots
            .insert(key.to_string(), Slot { payload, revision });
        Ok(())
    }

    async fn update(&self, key: &str, payload: String) -> Result<(), AppError> {
        let mut records = self.lock();
        let revision = records.tick();
        let slot = records.slots.get_mut(key).ok_or_else(|| missing(key))?;
        slot.payload = payload;
        slot.revision = revision;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.lock().slots.remove(key).is_some())
    }

    async fn read_for_update(&self, key: &str) -> Result<Versioned, AppError> {
        self.lock()
            .slots
            .get(key)
            .map(|slot| Versioned {
                payload: slot.payload.clone(),
                version: VersionToken::new(slot.revision),
            })
            .ok_or_else(|| missing(key))
    }

    async fn commit_if_unchanged(
        &self,
        key: &str,
        version: VersionToken,
        payload: String,
    ) -> Result<bool, AppError> {
        let mut records = self.lock();
        let current = records.slots.get(key).map(|slot| slot.revision);
        if current != Some(version.revision()) {
            return Ok(false);
        }
        let revision = records.tick();
        if let Some(slot) = records.slots.get_mut(key) {
            slot.payload = payload;
            slot.revision = revision;
        }
        Ok(true)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut keys: Vec<String> = self
            .lock()
            .slots
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
