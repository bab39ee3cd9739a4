//! Storage adapter: a uniform async key/value contract and its tiers.
//!
//! Values are opaque UTF-8 strings. [`TieredStorage`] stacks a durable
//! [`FileStore`], a secondary [`IndexedStore`] and an in-process
//! [`MemoryStore`], falling through on quota exhaustion. [`JsonStore`] adds
//! namespaced keys, typed JSON access, quarantine of corrupt values and
//! per-key write ordering on top of any store.

mod file;
mod indexed;
mod json;
mod memory;
mod tiered;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use indexed::IndexedStore;
pub use json::{JsonStore, WriteOutcome};
pub use memory::MemoryStore;
pub use tiered::TieredStorage;

/// Errors raised by storage tiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("{tier} storage quota exceeded")]
    QuotaExceeded { tier: &'static str },

    #[error("{tier} storage unavailable: {detail}")]
    Unavailable { tier: &'static str, detail: String },

    #[error("corrupted data under {key}: {detail}")]
    Corrupted { key: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether the adapter should move on to the next tier.
    #[must_use]
    pub const fn is_tier_failure(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::Unavailable { .. })
    }

    pub(crate) fn io(tier: &'static str, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            Self::QuotaExceeded { tier }
        } else {
            Self::Unavailable {
                tier,
                detail: err.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Asynchronous key/value contract shared by every tier and the adapter itself.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short tier label used in logs and errors.
    fn tier_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;
}
