use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{KeyValueStore, Result, StorageError};

const TIER: &str = "file";
const VALUE_EXT: &str = "val";
const TEMP_EXT: &str = "tmp";

/// Durable tier: one file per key under a directory.
///
/// Writes go to a temporary file and are renamed into place, so a value is
/// always replaced whole.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes: None,
        }
    }

    /// Cap the total bytes stored across all values.
    #[must_use]
    pub const fn with_quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{VALUE_EXT}", encode_key(key)))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(TIER, &e))
    }

    async fn used_bytes_excluding(&self, skip: &Path) -> Result<u64> {
        let mut total = 0;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(TIER, &e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(TIER, &e))?
        {
            let path = entry.path();
            if path == skip || path.extension().is_none_or(|ext| ext != VALUE_EXT) {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                total += meta.len();
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn tier_name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(TIER, &e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.path_for(key);
        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes_excluding(&path).await?;
            if used + value.len() as u64 > quota {
                return Err(StorageError::QuotaExceeded { tier: TIER });
            }
        }
        let temp = path.with_extension(TEMP_EXT);
        fs::write(&temp, value.as_bytes())
            .await
            .map_err(|e| StorageError::io(TIER, &e))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| StorageError::io(TIER, &e))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(TIER, &e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StorageError::io(TIER, &e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(TIER, &e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != VALUE_EXT) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(decode_key)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Escape a key into a portable file stem (`%XX` for anything unusual).
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_is_reversible() {
        for key in ["alchemy_stats", "alchemy_session_2025-01-04", "odd key/with|bits é"] {
            let encoded = encode_key(key);
            assert!(!encoded.contains('/'));
            assert_eq!(decode_key(&encoded).as_deref(), Some(key));
        }
        assert_eq!(decode_key("bad%Z"), None);
    }

    #[tokio::test]
    async fn roundtrips_values_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("kv"));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert!(store.keys().await.unwrap().is_empty());

        store.set("alchemy_stats", "{\"a\":1}").await.unwrap();
        store.set("alchemy_stats", "{\"a\":2}").await.unwrap();
        store.set("alchemy_session_2025-01-01", "{}").await.unwrap();
        assert_eq!(
            store.get("alchemy_stats").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );
        assert_eq!(
            store.keys().await.unwrap(),
            vec!["alchemy_session_2025-01-01", "alchemy_stats"]
        );

        store.remove("alchemy_stats").await.unwrap();
        store.remove("alchemy_stats").await.unwrap();
        assert_eq!(store.get("alchemy_stats").await.unwrap(), None);
    }

    #[tokio::test]
    async fn quota_is_enforced_across_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).with_quota(8);
        store.set("a", "12345").await.unwrap();
        store.set("a", "1234567").await.unwrap();
        let err = store.set("b", "123").await.unwrap_err();
        assert_eq!(err, StorageError::QuotaExceeded { tier: TIER });
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
