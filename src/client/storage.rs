//! Durable per-profile key-value storage for the client limiter.
//!
//! Values are strings, like a browser's local storage. [`PersistedStore`]
//! keeps each limiter key's timestamps there as a JSON array of epoch ms.

use dashmap::DashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::window::{StoreError, TimestampStore};

pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// Several limiters can share one profile
impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set_item(key, value)
    }
}

// One file per key inside a profile directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // write-then-rename so a crash never leaves half a value behind
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// Process-local storage, for tests and for embedding without a disk
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// Anything that is not a JSON array of non-negative integers reads as no data
pub struct PersistedStore<K> {
    storage: K,
}

impl<K: KeyValueStorage> PersistedStore<K> {
    pub fn new(storage: K) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &K {
        &self.storage
    }
}

impl<K: KeyValueStorage> TimestampStore for PersistedStore<K> {
    fn load(&self, key: &str) -> Result<Vec<u64>, StoreError> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str::<Vec<u64>>(&raw).unwrap_or_else(|e| {
            debug!(key, error = %e, "ignoring malformed stored timestamps");
            Vec::new()
        }))
    }

    fn save(&self, key: &str, timestamps: &[u64]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(timestamps)?;
        self.storage.set_item(key, &raw)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Storage that refuses every call, like a disabled or full local storage
    pub(crate) struct UnavailableStorage;

    impl KeyValueStorage for UnavailableStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("storage disabled".into()))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".into()))
        }
    }

    #[test]
    fn file_storage_round_trips_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("profile"));
        assert_eq!(storage.get_item("contact_form_submissions").unwrap(), None);

        storage.set_item("contact_form_submissions", "[1,2]").unwrap();
        assert_eq!(
            storage.get_item("contact_form_submissions").unwrap().as_deref(),
            Some("[1,2]")
        );
    }

    #[test]
    fn file_storage_keeps_odd_keys_inside_its_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let path = storage.path_for("../../etc/passwd");
        assert_eq!(path.parent(), Some(dir.path()));
    }

    #[test]
    fn persisted_layout_is_a_json_array() {
        let store = PersistedStore::new(MemoryStorage::new());
        store.save("k", &[1_700_000_000_000, 1_700_000_000_500]).unwrap();
        assert_eq!(
            store.storage().get_item("k").unwrap().as_deref(),
            Some("[1700000000000,1700000000500]")
        );
    }

    #[test]
    fn malformed_values_read_as_empty() {
        let store = PersistedStore::new(MemoryStorage::new());
        for raw in [r#"{"a":1}"#, "not json", r#"["x"]"#, "[-5]", "null", ""] {
            store.storage().set_item("k", raw).unwrap();
            assert!(store.load("k").unwrap().is_empty(), "value {raw:?}");
        }
    }

    #[test]
    fn unavailable_storage_surfaces_as_error() {
        let store = PersistedStore::new(UnavailableStorage);
        assert!(store.load("k").is_err());
        assert!(store.save("k", &[1]).is_err());
    }
}
