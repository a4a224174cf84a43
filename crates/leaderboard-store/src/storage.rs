use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::StorageError;

/// String key-value storage shared by every listing in the process.
///
/// Mirrors the browser `localStorage` contract: flat string keys and values,
/// synchronous access, a byte quota that rejects oversized writes.
pub trait Storage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns a backend-specific error when the value cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write or overwrite a value.
    ///
    /// # Errors
    /// Returns [`StorageError::QuotaExceeded`] when the write does not fit,
    /// or a backend-specific error when persisting fails.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    /// Returns a backend-specific error when persisting fails.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Every stored key.
    ///
    /// # Errors
    /// Returns a backend-specific error when the keys cannot be listed.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Read-modify-write `key` under a single lock acquisition.
    ///
    /// `apply` sees the current value and returns the replacement, or `None`
    /// to leave the entry untouched. No other write to the storage can land
    /// between the read and the write.
    ///
    /// # Errors
    /// Returns the error of `apply`, or the error of the write as
    /// [`set_item`](Self::set_item) would.
    fn update<F>(&self, key: &str, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(Option<&str>) -> Result<Option<String>, StorageError>;
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }

    fn update<F>(&self, key: &str, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(Option<&str>) -> Result<Option<String>, StorageError>,
    {
        (**self).update(key, apply)
    }
}

/// Key-value map with quota accounting, shared by both backends.
#[derive(Debug, Default, Clone)]
struct Entries {
    map: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl Entries {
    fn usage(&self) -> usize {
        self.map.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    fn check_quota(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let replaced = self.map.get(key).map_or(0, |old| key.len() + old.len());
        let needed = self.usage() - replaced + key.len() + value.len();
        if needed > quota {
            return Err(StorageError::QuotaExceeded { needed, quota });
        }
        Ok(())
    }

    fn insert(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_quota(key, value)?;
        self.map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

fn lock(entries: &Mutex<Entries>) -> Result<MutexGuard<'_, Entries>, StorageError> {
    entries.lock().map_err(|_| StorageError::Lock)
}

/// Process-local storage that lives as long as the handle.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<Entries>,
}

impl MemoryStorage {
    /// Unbounded in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory storage that rejects writes beyond `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: BTreeMap::new(),
                quota: Some(quota),
            }),
        }
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries)?.map.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries)?.insert(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries)?.map.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.entries)?.map.keys().cloned().collect())
    }

    fn update<F>(&self, key: &str, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(Option<&str>) -> Result<Option<String>, StorageError>,
    {
        let mut entries = lock(&self.entries)?;
        let replaced = apply(entries.map.get(key).map(String::as_str))?;
        let result = replaced.map_or(Ok(()), |value| entries.insert(key, &value));
        drop(entries);
        result
    }
}

/// Storage persisted as one JSON object on disk.
///
/// The whole map is rewritten through a temporary file and renamed into place
/// on every mutation. Separate processes sharing the file race on writes and
/// the last writer wins.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    ///
    /// A file that cannot be decoded is treated as empty and overwritten by
    /// the next write.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>, quota: Option<usize>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "Discarding unreadable storage file");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = map.len(), "Opened storage file");
        Ok(Self {
            path,
            entries: Mutex::new(Entries { map, quota }),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(&entries.map)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut Entries) -> Result<(), StorageError>) -> Result<(), StorageError> {
        let mut guard = lock(&self.entries)?;
        let result = self.commit(&mut guard, apply);
        drop(guard);
        result
    }

    /// Apply `apply` to a copy of the locked entries, persist it, then
    /// publish it. The entries are unchanged when any step fails.
    fn commit(
        &self,
        entries: &mut Entries,
        apply: impl FnOnce(&mut Entries) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let mut staged = entries.clone();
        apply(&mut staged)?;
        self.persist(&staged)?;
        *entries = staged;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries)?.map.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.mutate(|entries| entries.insert(key, value))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if !lock(&self.entries)?.map.contains_key(key) {
            return Ok(());
        }
        self.mutate(|entries| {
            entries.map.remove(key);
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.entries)?.map.keys().cloned().collect())
    }

    fn update<F>(&self, key: &str, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(Option<&str>) -> Result<Option<String>, StorageError>,
    {
        let mut guard = lock(&self.entries)?;
        let replaced = apply(guard.map.get(key).map(String::as_str));
        let result = match replaced {
            Ok(Some(value)) => self.commit(&mut guard, |entries| entries.insert(key, &value)),
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        drop(guard);
        result
    }
}
