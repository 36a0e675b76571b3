//! Local key/value persistence for favorites and histories.
//!
//! Values are opaque string blobs; callers own the encoding. [`FileStorage`]
//! keeps every key in one JSON object file and replaces it atomically on each
//! mutation, so a crash mid-write leaves the previous file intact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::StorageError;

/// Key holding the favorite poem ids.
pub const FAVORITES_KEY: &str = "poemFavorites";
/// Key holding the reading history.
pub const HISTORY_KEY: &str = "poemHistory";
/// Key holding the search history.
pub const SEARCH_HISTORY_KEY: &str = "poemSearchHistory";

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// File-backed storage
// ============================================================================

pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<IndexMap<String, String>>,
}

impl FileStorage {
    /// Open the state file at `path`.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// logged and also treated as empty; it is overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), "ignoring corrupt state file: {e}");
                IndexMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => {
                warn!(path = %path.display(), "cannot read state file: {e}");
                IndexMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(&self, f: impl FnOnce(&mut IndexMap<String, String>)) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut entries);
        let json = serde_json::to_string_pretty(&*entries)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Same directory as the target so the rename never crosses filesystems.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.shift_remove(key);
        })
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Ephemeral storage, lost when dropped.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<IndexMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let storage = FileStorage::open(&path);
        assert!(storage.get(FAVORITES_KEY).is_none());
        storage.set(FAVORITES_KEY, "[1,2]").unwrap();
        storage.set(HISTORY_KEY, "[]").unwrap();

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get(FAVORITES_KEY).as_deref(), Some("[1,2]"));
        assert_eq!(reopened.get(HISTORY_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn test_file_storage_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let storage = FileStorage::open(&path);
        storage.set(SEARCH_HISTORY_KEY, "[\"春\"]").unwrap();
        storage.remove(SEARCH_HISTORY_KEY).unwrap();
        storage.remove("never-set").unwrap();

        assert!(FileStorage::open(&path).get(SEARCH_HISTORY_KEY).is_none());
    }

    #[test]
    fn test_corrupt_file_loads_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path);
        assert!(storage.get(FAVORITES_KEY).is_none());
        storage.set(FAVORITES_KEY, "[3]").unwrap();
        assert_eq!(
            FileStorage::open(&path).get(FAVORITES_KEY).as_deref(),
            Some("[3]")
        );
    }

    #[test]
    fn test_writes_replace_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let storage = FileStorage::open(&path);
        storage.set(FAVORITES_KEY, "[1]").unwrap();
        storage.set(HISTORY_KEY, "[]").unwrap();
        storage.set(SEARCH_HISTORY_KEY, "[\"月\"]").unwrap();
        storage.remove(HISTORY_KEY).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("state.json")]);

        let on_disk: IndexMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get(FAVORITES_KEY).map(String::as_str), Some("[1]"));
        assert_eq!(on_disk.get(SEARCH_HISTORY_KEY).map(String::as_str), Some("[\"月\"]"));
        assert!(!on_disk.contains_key(HISTORY_KEY));
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let storage = FileStorage::open(&path);
        storage.set(FAVORITES_KEY, "[1]").unwrap();
        storage.set(SEARCH_HISTORY_KEY, "[\"春\"]").unwrap();

        // A directory at the target path makes the final rename fail.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        let broken = FileStorage::open(&blocked);
        assert!(broken.set(FAVORITES_KEY, "[2]").is_err());
        assert!(blocked.is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get(FAVORITES_KEY).as_deref(), Some("[1]"));
        assert_eq!(reopened.get(SEARCH_HISTORY_KEY).as_deref(), Some("[\"春\"]"));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").as_deref(), Some("v"));
        storage.remove("k").unwrap();
        assert!(storage.get("k").is_none());
    }
}
