use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{KeyValueStore, Result, StorageError};
use crate::clock::Clock;
use crate::constants::{LOG_QUARANTINE, QUARANTINE_SUFFIX};

/// What happened to a queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// A newer write for the same key was issued first; this one was dropped.
    Superseded,
}

#[derive(Debug, Default)]
struct KeySlot {
    issued: AtomicU64,
    lock: tokio::sync::Mutex<()>,
}

/// Namespaced JSON view over a [`KeyValueStore`].
///
/// Writes to one key are serialised; a write that is still waiting when a
/// newer one for the same key is issued is skipped (last write by issue
/// order wins). Values that fail to parse are moved aside to
/// `<key>.corrupt-<millis>` and reported as [`StorageError::Corrupted`].
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<dyn KeyValueStore>,
    namespace: String,
    clock: Arc<dyn Clock>,
    slots: Arc<Mutex<HashMap<String, Arc<KeySlot>>>>,
}

impl std::fmt::Debug for JsonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStore")
            .field("namespace", &self.namespace)
            .field("tier", &self.inner.tier_name())
            .finish_non_exhaustive()
    }
}

impl JsonStore {
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>, namespace: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            namespace: namespace.to_string(),
            clock,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `<namespace>_<suffix>`
    #[must_use]
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.namespace)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner
    }

    fn slot(&self, key: &str) -> Arc<KeySlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Read and decode a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` (after quarantining the value) when it
    /// does not parse, or the underlying tier error.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.inner.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                self.quarantine(key, &raw).await;
                Err(StorageError::Corrupted {
                    key: key.to_string(),
                    detail: err.to_string(),
                })
            }
        }
    }

    /// Like [`Self::load`] but recovers to `T::default()` on any failure.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.load(key).await {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(err) => {
                log::warn!("{key}: falling back to defaults ({err})");
                T::default()
            }
        }
    }

    /// Encode and write a value, serialised per key.
    ///
    /// # Errors
    ///
    /// Returns serialization errors or the underlying tier error.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<WriteOutcome> {
        let body =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.save_raw(key, body).await
    }

    /// Write an already-encoded body, serialised per key.
    ///
    /// # Errors
    ///
    /// Returns the underlying tier error.
    pub async fn save_raw(&self, key: &str, body: String) -> Result<WriteOutcome> {
        let slot = self.slot(key);
        let ticket = slot.issued.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = slot.lock.lock().await;
        if slot.issued.load(Ordering::Acquire) != ticket {
            return Ok(WriteOutcome::Superseded);
        }
        self.inner.set(key, &body).await?;
        Ok(WriteOutcome::Written)
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns the underlying tier error.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let slot = self.slot(key);
        slot.issued.fetch_add(1, Ordering::AcqRel);
        let _guard = slot.lock.lock().await;
        self.inner.remove(key).await
    }

    /// Move a corrupt value aside so the key can be reinitialised.
    pub async fn quarantine(&self, key: &str, raw: &str) -> Option<String> {
        let aside = format!(
            "{key}.{QUARANTINE_SUFFIX}-{}",
            self.clock.now().timestamp_millis()
        );
        log::warn!("{LOG_QUARANTINE}: {key} failed to parse; moved to {aside}");
        if let Err(err) = self.inner.set(&aside, raw).await {
            log::warn!("{LOG_QUARANTINE}: could not keep a copy of {key}: {err}");
        }
        match self.inner.remove(key).await {
            Ok(()) => Some(aside),
            Err(err) => {
                log::warn!("{LOG_QUARANTINE}: could not clear {key}: {err}");
                None
            }
        }
    }

    /// Keys under this namespace.
    ///
    /// # Errors
    ///
    /// Returns the underlying tier error.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let prefix = format!("{}_", self.namespace);
        Ok(self
            .inner
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .collect())
    }
}
