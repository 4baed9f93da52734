//! Process-local [`StateStore`] backed by a [`DashMap`] (§4.3).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::StateError;
use crate::store::StateStore;

/// An in-memory state store, safe for concurrent access from any number of
/// tasks. Values never leave the process; there is nothing to reconnect.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: DashMap<String, Value>,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StateError> {
        Ok(self.values.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StateError> {
        Ok(self.values.contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateError> {
        Ok(self
            .values
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}
