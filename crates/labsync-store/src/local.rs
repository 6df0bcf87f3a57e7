//! Synchronous local key-value store
//!
//! The local store is the fast cache every component reads from. Values are JSON
//! strings under stable keys (see [`crate::keys`]). Operations never suspend.

use crate::error::StorageError;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::error;

/// String key-value persistence
pub trait LocalStore: Send + Sync + Debug {
    /// Raw value under `key`
    ///
    /// # Errors
    /// Returns an error when the backing medium cannot be read
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value under `key`
    ///
    /// # Errors
    /// Returns an error when the backing medium cannot be written
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Drop `key`; removing a missing key is not an error
    ///
    /// # Errors
    /// Returns an error when the backing medium cannot be written
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed helpers over any [`LocalStore`]
pub trait LocalStoreExt: LocalStore {
    /// Decode the record under `key`
    ///
    /// # Errors
    /// Returns [`StorageError::Malformed`] when the stored value has the wrong shape
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.get(key)?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|source| StorageError::Malformed {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Encode and store a record
    ///
    /// # Errors
    /// Returns an error when encoding or writing fails
    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw)
    }

    /// Decode the record, logging and discarding any failure
    fn load_or_log<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.load(key) {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "failed to load local record");
                None
            }
        }
    }

    /// Store the record, logging any failure; returns whether it was written
    fn save_or_log<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match self.save(key, value) {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "failed to persist local record");
                false
            }
        }
    }

    /// Remove the record, logging any failure
    fn remove_or_log(&self, key: &str) {
        if let Err(e) = self.remove(key) {
            error!(key, error = %e, "failed to remove local record");
        }
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Store mirrored to a single JSON file
///
/// The whole map is rewritten on each mutation, which is fine for the handful of
/// small records a workshop instance keeps.
#[derive(Debug)]
pub struct FileLocalStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileLocalStore {
    /// Open the store at `path`, creating it on first write
    ///
    /// # Errors
    /// Returns an error when an existing file cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|source| StorageError::Malformed {
                    key: path.display().to_string(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file location
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
