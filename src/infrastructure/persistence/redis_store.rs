//! Redis-backed record store.
//!
//! Each key is a Redis hash with two fields:
//!
//! - `data` - the JSON payload
//! - `rev`  - the revision of the last write
//!
//! Revisions are drawn from one store-wide counter (`INCR` on
//! [`REVISION_CLOCK_KEY`]), so a key that is deleted and created again never
//! reuses a revision an earlier reader may still hold.
//!
//! Writes that must observe the current state (create, update, conditional
//! commit) run as Lua scripts so the check and the write are a single atomic
//! step on the server. This works over the multiplexed [`ConnectionManager`],
//! which a `WATCH`/`MULTI` transaction would not.

use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use serde_json::json;
use tracing::{debug, info};

use crate::domain::repositories::{RecordStore, VersionToken, Versioned};
use crate::error::AppError;

const FIELD_DATA: &str = "data";
const FIELD_REV: &str = "rev";

/// Counter every write draws its revision from.
pub const REVISION_CLOCK_KEY: &str = "redir:meta:clock";

const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
local rev = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'data', ARGV[1], 'rev', rev)
return 1
"#;

const UPDATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local rev = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'data', ARGV[1], 'rev', rev)
return 1
"#;

const COMMIT_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'rev')
if not current or current ~= ARGV[1] then
    return 0
end
local rev = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'data', ARGV[2], 'rev', rev)
return 1
"#;

/// Redis implementation of [`RecordStore`].
pub struct RedisStore {
    client: ConnectionManager,
    create_script: Script,
    update_script: Script,
    commit_script: Script,
}

impl RedisStore {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] if the URL is invalid, the connection
    /// cannot be established, or the PING fails.
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        info!("Connecting to Redis store");

        let client = Client::open(redis_url).map_err(|e| {
            AppError::unavailable(
                "Failed to create Redis client",
                json!({ "reason": e.to_string() }),
            )
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            AppError::unavailable(
                "Failed to connect to Redis",
                json!({ "reason": e.to_string() }),
            )
        })?;

        let mut test_conn = manager.clone();
        test_conn.ping::<()>().await.map_err(|e| {
            AppError::unavailable("Redis PING failed", json!({ "reason": e.to_string() }))
        })?;

        info!("✓ Connected to Redis store");

        Ok(Self {
            client: manager,
            create_script: Script::new(CREATE_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
            commit_script: Script::new(COMMIT_SCRIPT),
        })
    }
}

fn missing(key: &str) -> AppError {
    AppError::not_found("Record not found", json!({ "key": key }))
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn get(&self, key: &str) -> Result<String, AppError> {
        let mut conn = self.client.clone();
        let data: Option<String> = conn.hget(key, FIELD_DATA).await?;
        data.ok_or_else(|| missing(key))
    }

    async fn create(&self, key: &str, payload: String) -> Result<(), AppError> {
        let mut conn = self.client.clone();
        let created: i64 = self
            .create_script
            .key(key)
            .key(REVISION_CLOCK_KEY)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(AppError::conflict(
                "Record already exists",
                json!({ "key": key }),
            ));
        }
        debug!("Store CREATE: {}", key);
        Ok(())
    }

    async fn update(&self, key: &str, payload: String) -> Result<(), AppError> {
        let mut conn = self.client.clone();
        let updated: i64 = self
            .update_script
            .key(key)
            .key(REVISION_CLOCK_KEY)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if updated == 0 {
            return Err(missing(key));
        }
        debug!("Store UPDATE: {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.client.clone();
        let deleted: i64 = conn.del(key).await?;
        if deleted > 0 {
            debug!("Store DELETE: {}", key);
        }
        Ok(deleted > 0)
    }

    async fn read_for_update(&self, key: &str) -> Result<Versioned, AppError> {
        let mut conn = self.client.clone();
        let (data, rev): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg(FIELD_DATA)
            .arg(FIELD_REV)
            .query_async(&mut conn)
            .await?;

        match (data, rev) {
            (Some(payload), Some(rev)) => Ok(Versioned {
                payload,
                version: VersionToken::new(rev),
            }),
            _ => Err(missing(key)),
        }
    }

    async fn commit_if_unchanged(
        &self,
        key: &str,
        version: VersionToken,
        payload: String,
    ) -> Result<bool, AppError> {
        let mut conn = self.client.clone();
        let committed: i64 = self
            .commit_script
            .key(key)
            .key(REVISION_CLOCK_KEY)
            .arg(version.revision())
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        Ok(committed == 1)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.client.clone();
        let mut keys: Vec<String> = conn.keys(format!("{prefix}*")).await?;
        keys.sort();
        Ok(keys)
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.client.clone();
        conn.ping::<()>().await.is_ok()
    }
}
