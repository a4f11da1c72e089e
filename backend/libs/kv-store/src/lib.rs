//! Narrow key-value storage interface for platform services.
//!
//! Services that need durable-ish state (credentials, refresh tokens) talk
//! to this trait instead of a concrete database, so the backing store can be
//! swapped (in-memory, Redis, relational) without touching service logic.

use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Minimal async key-value interface, keyed by `(namespace, key)`.
///
/// Values are opaque bytes; callers are responsible for serialization.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()>;

    /// Returns `true` if the key existed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// All `(key, value)` pairs in a namespace. Intended for admin/startup
    /// paths, not the hot path.
    async fn list(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// In-memory store backed by a concurrent map. The default backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|v| v.value().clone()))
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("users", "alice", b"data".to_vec()).await.unwrap();

        let value = store.get("users", "alice").await.unwrap();
        assert_eq!(value, Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.put("users", "k", b"a".to_vec()).await.unwrap();
        store.put("tokens", "k", b"b".to_vec()).await.unwrap();

        assert_eq!(store.get("users", "k").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.get("tokens", "k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryStore::new();
        store.put("users", "alice", b"data".to_vec()).await.unwrap();

        assert!(store.delete("users", "alice").await.unwrap());
        assert!(!store.delete("users", "alice").await.unwrap());
        assert_eq!(store.get("users", "alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_namespace() {
        let store = MemoryStore::new();
        store.put("users", "a", b"1".to_vec()).await.unwrap();
        store.put("users", "b", b"2".to_vec()).await.unwrap();
        store.put("other", "c", b"3".to_vec()).await.unwrap();

        let mut keys: Vec<String> = store
            .list("users")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
