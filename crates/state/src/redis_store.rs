//! Redis-backed [`StateStore`] (§4.3). One logical key per Redis key,
//! JSON-encoded, no TTL.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::error::StateError;
use crate::store::StateStore;

/// A [`StateStore`] backed by a shared Redis [`ConnectionManager`], which
/// reconnects transparently on connection loss.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    /// Connect to `url` and build a store around it.
    pub async fn connect(url: &str) -> Result<Self, StateError> {
        let client = redis::Client::open(url).map_err(|e| StateError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        let encoded = serde_json::to_string(&value).map_err(|source| StateError::Decode {
            key: key.to_owned(),
            source,
        })?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, encoded)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StateError::Decode {
                key: key.to_owned(),
                source,
            })
        })
        .transpose()
    }

    async fn delete(&self, key: &str) -> Result<bool, StateError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StateError> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateError> {
        let mut conn = self.conn.clone();
        conn.keys(format!("{prefix}*"))
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }
}
