//! Durable key/value stores backing the expiring cache
//!
//! The cache only needs a small synchronous surface: read, write, remove and
//! enumerate string keys. Two backends are provided: an in-process map that
//! behaves like a browser's per-origin local storage, and a directory of JSON
//! files that survives between runs.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use directories::ProjectDirs;
use thiserror::Error;

/// Errors raised by a durable store on write
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would push the store past its capacity
    #[error("Storage quota exceeded writing '{key}': {needed} bytes needed, capacity is {capacity}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        capacity: usize,
    },

    /// The key cannot be represented by this store
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    /// Filesystem access failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// A synchronous, string-keyed, capacity-bounded store
///
/// Mirrors the shape of browser local storage: keys are enumerable by index
/// through [`DurableStore::key`] and [`DurableStore::len`], and writes may fail
/// when the store is full. Index order is only stable while the store is not
/// modified.
pub trait DurableStore: Send + Sync {
    /// Returns the value stored under `key`, if any
    fn get_item(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; removing a missing key is a no-op
    fn remove_item(&self, key: &str);

    /// Returns the key at position `index`
    fn key(&self, index: usize) -> Option<String>;

    /// Number of stored keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process store with optional byte capacity
///
/// Capacity is counted as the summed length of keys and values, which is how
/// browsers account local storage usage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Creates an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes beyond `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            capacity: Some(capacity),
        }
    }

    /// Bytes currently in use
    pub fn used_bytes(&self) -> usize {
        lock(&self.items)
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl DurableStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        lock(&self.items).get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = lock(&self.items);

        if let Some(capacity) = self.capacity {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = used + key.len() + value.len();
            if needed > capacity {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    capacity,
                });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        lock(&self.items).remove(key);
    }

    fn key(&self, index: usize) -> Option<String> {
        lock(&self.items).keys().nth(index).cloned()
    }

    fn len(&self) -> usize {
        lock(&self.items).len()
    }
}

/// Directory-backed store, one `<key>.json` file per entry
///
/// Uses `~/.cache/invoicedesk/` on Linux when created with [`FileStore::new`].
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    capacity: Option<usize>,
}

const FILE_SUFFIX: &str = ".json";

impl FileStore {
    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "invoicedesk")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store in a specific directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            capacity: None,
        }
    }

    /// Limits the summed size of all entry files
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.contains('\0')
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}{FILE_SUFFIX}")))
    }

    /// Sorted list of keys currently on disk
    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(FILE_SUFFIX))
                    .map(str::to_string)
            })
            .collect();
        keys.sort();
        keys
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.keys()
            .into_iter()
            .filter(|k| k != key)
            .filter_map(|k| self.path_for(&k).ok())
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len() as usize)
            .sum()
    }
}

impl DurableStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        let path = self.path_for(key).ok()?;
        fs::read_to_string(path).ok()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;

        if let Some(capacity) = self.capacity {
            let needed = self.used_bytes_excluding(key) + value.len();
            if needed > capacity {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    capacity,
                });
            }
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        if let Ok(path) = self.path_for(key) {
            let _ = fs::remove_file(path);
        }
    }

    fn key(&self, index: usize) -> Option<String> {
        self.keys().into_iter().nth(index)
    }

    fn len(&self) -> usize {
        self.keys().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_file_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        store.set_item("a", "1").unwrap();

        assert_eq!(store.get_item("a").as_deref(), Some("1"));
        assert_eq!(store.len(), 1);

        store.remove_item("a");
        assert!(store.get_item("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_keys_enumerate_in_order() {
        let store = MemoryStore::new();
        store.set_item("b", "2").unwrap();
        store.set_item("a", "1").unwrap();

        assert_eq!(store.key(0).as_deref(), Some("a"));
        assert_eq!(store.key(1).as_deref(), Some("b"));
        assert!(store.key(2).is_none());
    }

    #[test]
    fn test_memory_store_rejects_write_over_capacity() {
        let store = MemoryStore::with_capacity(10);
        store.set_item("k", "12345").unwrap();

        let err = store.set_item("other", "123456").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        assert!(store.get_item("other").is_none());
    }

    #[test]
    fn test_memory_store_overwrite_does_not_double_count() {
        let store = MemoryStore::with_capacity(10);
        store.set_item("k", "12345678").unwrap();
        store.set_item("k", "87654321").unwrap();

        assert_eq!(store.get_item("k").as_deref(), Some("87654321"));
        assert_eq!(store.used_bytes(), 9);
    }

    #[test]
    fn test_file_store_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested_path.clone());

        store.set_item("invoice-1", "{}").expect("Write should succeed");

        assert!(nested_path.join("invoice-1.json").exists());
    }

    #[test]
    fn test_file_store_roundtrip_and_enumeration() {
        let (store, _temp_dir) = create_file_store();
        store.set_item("supplier-2", "b").unwrap();
        store.set_item("invoice-1", "a").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.key(0).as_deref(), Some("invoice-1"));
        assert_eq!(store.key(1).as_deref(), Some("supplier-2"));
        assert_eq!(store.get_item("supplier-2").as_deref(), Some("b"));

        store.remove_item("invoice-1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let (store, _temp_dir) = create_file_store();

        assert!(matches!(
            store.set_item("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.set_item("a/b", "x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(store.get_item("../escape").is_none());
    }

    #[test]
    fn test_file_store_capacity() {
        let (store, _temp_dir) = create_file_store();
        let store = store.with_capacity(8);
        store.set_item("a", "12345").unwrap();

        assert!(matches!(
            store.set_item("b", "12345"),
            Err(StoreError::QuotaExceeded { .. })
        ));
        // Replacing an entry only counts the new size
        store.set_item("a", "1234567").unwrap();
    }

    #[test]
    fn test_file_store_new_uses_project_name() {
        if let Some(store) = FileStore::new() {
            assert!(store.dir().to_string_lossy().contains("invoicedesk"));
        }
    }
}
