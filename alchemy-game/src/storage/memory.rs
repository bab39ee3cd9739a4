use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::{KeyValueStore, Result, StorageError};

const TIER: &str = "memory";

/// In-process map. The last tier: it only refuses writes when a quota is set.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the total bytes of keys plus values.
    #[must_use]
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn tier_name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded { tier: TIER });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_removes_values() {
        let store = MemoryStore::new();
        store.set("alchemy_stats", "{}").await.unwrap();
        assert_eq!(store.get("alchemy_stats").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.keys().await.unwrap(), vec!["alchemy_stats"]);
        store.remove("alchemy_stats").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn quota_refuses_oversized_writes_but_allows_replacement() {
        let store = MemoryStore::new().with_quota(10);
        store.set("k", "12345").await.unwrap();
        // Replacing the same key only counts the new value.
        store.set("k", "123456789").await.unwrap();
        let err = store.set("other", "x").await.unwrap_err();
        assert_eq!(err, StorageError::QuotaExceeded { tier: TIER });
    }
}
