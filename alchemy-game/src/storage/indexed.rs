use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::{KeyValueStore, Result, StorageError};
use crate::constants::QUARANTINE_SUFFIX;

const TIER: &str = "indexed";

/// Secondary tier: every key lives in one JSON index file that is rewritten
/// whole (temp file + rename) on each mutation.
#[derive(Debug)]
pub struct IndexedStore {
    path: PathBuf,
    quota_bytes: Option<usize>,
    index: Mutex<Option<BTreeMap<String, String>>>,
}

impl IndexedStore {
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota_bytes: None,
            index: Mutex::new(None),
        }
    }

    /// Cap the serialized size of the index file.
    #[must_use]
    pub const fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StorageError::io(TIER, &e)),
        };
        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(err) => {
                let aside = self.path.with_extension(QUARANTINE_SUFFIX);
                log::warn!(
                    "{}: index {} unreadable ({err}); moved to {}",
                    crate::constants::LOG_QUARANTINE,
                    self.path.display(),
                    aside.display()
                );
                let _ = fs::rename(&self.path, &aside).await;
                Ok(BTreeMap::new())
            }
        }
    }

    async fn write(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let body =
            serde_json::to_string(map).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if let Some(quota) = self.quota_bytes
            && body.len() > quota
        {
            return Err(StorageError::QuotaExceeded { tier: TIER });
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(TIER, &e))?;
        }
        let temp = self.path.with_extension("tmp");
        fs::write(&temp, body.as_bytes())
            .await
            .map_err(|e| StorageError::io(TIER, &e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StorageError::io(TIER, &e))
    }

    /// Run `f` against the loaded index.
    async fn with_index<R>(
        &self,
        f: impl FnOnce(&BTreeMap<String, String>) -> R + Send,
    ) -> Result<R> {
        let mut guard = self.index.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(f(guard.get_or_insert_with(BTreeMap::new)))
    }
}

#[async_trait]
impl KeyValueStore for IndexedStore {
    fn tier_name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_index(|map| map.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.index.lock().await;
        let mut next = match guard.take() {
            Some(map) => map,
            None => self.load().await?,
        };
        let previous = next.insert(key.to_string(), value.to_string());
        let written = self.write(&next).await;
        if written.is_err() {
            match previous {
                Some(old) => next.insert(key.to_string(), old),
                None => next.remove(key),
            };
        }
        *guard = Some(next);
        written
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.index.lock().await;
        let mut next = match guard.take() {
            Some(map) => map,
            None => self.load().await?,
        };
        let result = if next.remove(key).is_some() {
            self.write(&next).await
        } else {
            Ok(())
        };
        *guard = Some(next);
        result
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.with_index(|map| map.keys().cloned().collect()).await
    }
}
