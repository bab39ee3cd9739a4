use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{FileStore, IndexedStore, KeyValueStore, MemoryStore, Result, StorageError};
use crate::constants::LOG_TIER_FALLBACK;

const TIER: &str = "tiered";

/// The storage adapter: tries each tier in order.
///
/// Writes go to the current write tier; a tier that reports quota exhaustion
/// or unavailability is skipped for every later write. Reads consult tiers in
/// order and return the first hit, except for keys whose older copy in an
/// earlier tier could not be removed: those are read from the tier that
/// took the newest write.
pub struct TieredStorage {
    tiers: Vec<Arc<dyn KeyValueStore>>,
    write_tier: AtomicUsize,
    degraded_reported: AtomicBool,
    newest: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for TieredStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.tiers.iter().map(|t| t.tier_name()).collect();
        f.debug_struct("TieredStorage")
            .field("tiers", &names)
            .field("write_tier", &self.write_tier.load(Ordering::Relaxed))
            .finish()
    }
}

impl TieredStorage {
    #[must_use]
    pub fn new(tiers: Vec<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            tiers,
            write_tier: AtomicUsize::new(0),
            degraded_reported: AtomicBool::new(false),
            newest: Mutex::new(HashMap::new()),
        }
    }

    /// File tier, index tier and memory tier rooted at `dir`.
    #[must_use]
    pub fn standard(dir: &Path) -> Self {
        Self::new(vec![
            Arc::new(FileStore::new(dir.join("kv"))),
            Arc::new(IndexedStore::open(dir.join("index.json"))),
            Arc::new(MemoryStore::new()),
        ])
    }

    /// Memory only; nothing survives the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(vec![Arc::new(MemoryStore::new())])
    }

    /// Name of the tier currently receiving writes.
    #[must_use]
    pub fn active_tier(&self) -> Option<&'static str> {
        self.tiers
            .get(self.write_tier.load(Ordering::Acquire))
            .map(|t| t.tier_name())
    }

    /// True once writes have fallen through to the last (in-process) tier.
    #[must_use]
    pub fn is_memory_only(&self) -> bool {
        let index = self.write_tier.load(Ordering::Acquire);
        index > 0 && index + 1 >= self.tiers.len()
    }

    /// One-shot warning once durable tiers are exhausted.
    pub fn take_degraded_warning(&self) -> Option<String> {
        if !self.is_memory_only() || self.degraded_reported.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some("Progress is being kept in memory only and will not survive a restart.".to_string())
    }

    fn newest(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.newest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn demote_from(&self, index: usize, err: &StorageError) {
        let next = index + 1;
        if self
            .write_tier
            .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let from = self.tiers[index].tier_name();
            let to = self.tiers.get(next).map_or("none", |t| t.tier_name());
            log::warn!("{LOG_TIER_FALLBACK}: {from} refused write ({err}); falling back to {to}");
        }
    }
}

#[async_trait]
impl KeyValueStore for TieredStorage {
    fn tier_name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let first = self.newest().get(key).copied().unwrap_or(0);
        for tier in self.tiers.iter().skip(first) {
            match tier.get(key).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(err) => log::debug!("{} read of {key} failed: {err}", tier.tier_name()),
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let start = self.write_tier.load(Ordering::Acquire);
        for index in start..self.tiers.len() {
            match self.tiers[index].set(key, value).await {
                Ok(()) => {
                    // Earlier tiers may hold an older copy that would shadow this one.
                    let mut shadowed = false;
                    for stale in &self.tiers[..index] {
                        if let Err(err) = stale.remove(key).await {
                            log::warn!(
                                "{LOG_TIER_FALLBACK}: stale {key} left in {} ({err}); reads skip it",
                                stale.tier_name()
                            );
                            shadowed = true;
                        }
                    }
                    let mut newest = self.newest();
                    if shadowed {
                        newest.insert(key.to_string(), index);
                    } else {
                        newest.remove(key);
                    }
                    return Ok(());
                }
                Err(err) if err.is_tier_failure() => self.demote_from(index, &err),
                Err(err) => return Err(err),
            }
        }
        Err(StorageError::Unavailable {
            tier: TIER,
            detail: "every storage tier refused the write".to_string(),
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.newest().remove(key);
        let mut last_err = None;
        let mut removed_any = false;
        for tier in &self.tiers {
            match tier.remove(key).await {
                Ok(()) => removed_any = true,
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) if !removed_any => Err(err),
            _ => Ok(()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();
        for tier in &self.tiers {
            match tier.keys().await {
                Ok(found) => keys.extend(found),
                Err(err) => log::debug!("{} key listing failed: {err}", tier.tier_name()),
            }
        }
        Ok(keys.into_iter().collect())
    }
}
