//! The [`StateStore`] trait every backend implements (§4.3).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StateError;

/// A pluggable, opaque-JSON key/value store.
///
/// `Set` is a full replace; there is no merge or patch operation. Callers
/// treat a failed [`StateStore::set`] as non-fatal — the workflow that
/// triggered it still completes, and the failure is logged by the caller.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the value stored at `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StateError>;

    /// Fetch the value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError>;

    /// Remove `key`. Returns whether a value was present.
    async fn delete(&self, key: &str) -> Result<bool, StateError>;

    /// Whether `key` currently has a value.
    async fn exists(&self, key: &str) -> Result<bool, StateError>;

    /// List every key with the given prefix.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateError>;
}
