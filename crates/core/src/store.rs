//! Persistent ordered key-value store backing `StoreSource`
//!
//! Keys are UTF-8 strings with a kind prefix (`zone/`, `zonemod/`, `alias/`,
//! `meta/`); values are UTF-8 text. LMDB keeps keys sorted, so prefix
//! iteration yields zones in id order.

use std::path::{Path, PathBuf};

use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};

use crate::error::{Result, TzError};

/// Key prefix for zone definitions
pub const ZONE_PREFIX: &str = "zone/";
/// Key prefix for per-zone last-modified timestamps
pub const ZONE_MODIFIED_PREFIX: &str = "zonemod/";
/// Key prefix for alias target lists
pub const ALIAS_PREFIX: &str = "alias/";
/// Dataset timestamp key
pub const DTSTAMP_KEY: &str = "meta/dtstamp";

/// Ordered key-value interface used by `StoreSource`.
pub trait KvStore: Send + Sync {
    /// Human-readable location, used in errors and logs
    fn location(&self) -> String;

    /// Get a value by key
    ///
    /// # Errors
    /// Returns an error if the read transaction fails.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value
    ///
    /// # Errors
    /// Returns an error if the write transaction fails.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key. Returns true if it existed.
    ///
    /// # Errors
    /// Returns an error if the write transaction fails.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order
    ///
    /// # Errors
    /// Returns an error if the read transaction fails.
    fn iterate(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Apply a batch of writes atomically. `None` deletes the key.
    ///
    /// # Errors
    /// Returns an error if any write fails; nothing is applied then.
    fn write_batch(&self, batch: &[(String, Option<String>)]) -> Result<()>;
}

/// LMDB-backed store.
pub struct LmdbStore {
    path: PathBuf,
    env: Env,
    /// tzdata database: prefixed key -> text
    data: Database<Str, Str>,
}

impl LmdbStore {
    /// Open or create a store at the given directory.
    ///
    /// # Errors
    /// Returns `SourceUnavailable` if the environment cannot be opened.
    #[allow(unsafe_code)]
    pub fn open(path: &Path) -> Result<Self> {
        let location = path.display().to_string();
        std::fs::create_dir_all(path).map_err(|e| TzError::unavailable(&location, e))?;

        // SAFETY: Standard LMDB memory-mapped I/O. The data file must not be
        // modified by another process while the Env is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(256 * 1024 * 1024) // 256MB max
                .max_dbs(1)
                .open(path)
                .map_err(|e| TzError::unavailable(&location, e))?
        };

        let mut wtxn = env
            .write_txn()
            .map_err(|e| TzError::unavailable(&location, e))?;
        let data: Database<Str, Str> = env
            .database_options()
            .types::<Str, Str>()
            .name("tzdata")
            .create(&mut wtxn)
            .map_err(|e| TzError::unavailable(&location, e))?;
        wtxn.commit()
            .map_err(|e| TzError::unavailable(&location, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            env,
            data,
        })
    }

    fn fault(&self, op: &str, e: heed::Error) -> TzError {
        TzError::internal(format!("store {op} at {}", self.path.display()), e)
    }

    /// Count of stored zones
    ///
    /// # Errors
    /// Returns an error if the read transaction fails.
    pub fn zone_count(&self) -> Result<usize> {
        let rtxn = self.env.read_txn().map_err(|e| self.fault("read", e))?;
        let iter = self
            .data
            .prefix_iter(&rtxn, ZONE_PREFIX)
            .map_err(|e| self.fault("iterate", e))?;
        Ok(iter.count())
    }

    /// Clear all stored data.
    ///
    /// # Errors
    /// Returns an error if the clear operation fails.
    pub fn clear(&self) -> Result<()> {
        let mut wtxn = self.env.write_txn().map_err(|e| self.fault("write", e))?;
        self.data
            .clear(&mut wtxn)
            .map_err(|e| self.fault("clear", e))?;
        wtxn.commit().map_err(|e| self.fault("commit", e))?;
        Ok(())
    }
}

impl KvStore for LmdbStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let rtxn = self.env.read_txn().map_err(|e| self.fault("read", e))?;
        let value = self
            .data
            .get(&rtxn, key)
            .map_err(|e| self.fault("get", e))?;
        Ok(value.map(str::to_string))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn().map_err(|e| self.fault("write", e))?;
        self.data
            .put(&mut wtxn, key, value)
            .map_err(|e| self.fault("put", e))?;
        wtxn.commit().map_err(|e| self.fault("commit", e))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut wtxn = self.env.write_txn().map_err(|e| self.fault("write", e))?;
        let existed = self
            .data
            .delete(&mut wtxn, key)
            .map_err(|e| self.fault("delete", e))?;
        wtxn.commit().map_err(|e| self.fault("commit", e))?;
        Ok(existed)
    }

    fn iterate(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let rtxn = self.env.read_txn().map_err(|e| self.fault("read", e))?;
        let iter = self
            .data
            .prefix_iter(&rtxn, prefix)
            .map_err(|e| self.fault("iterate", e))?;

        let mut out = Vec::new();
        for entry in iter {
            let (key, value) = entry.map_err(|e| self.fault("iterate", e))?;
            out.push((key.to_string(), value.to_string()));
        }
        Ok(out)
    }

    fn write_batch(&self, batch: &[(String, Option<String>)]) -> Result<()> {
        let mut wtxn = self.env.write_txn().map_err(|e| self.fault("write", e))?;
        for (key, value) in batch {
            match value {
                Some(value) => {
                    self.data
                        .put(&mut wtxn, key, value)
                        .map_err(|e| self.fault("put", e))?;
                }
                None => {
                    self.data
                        .delete(&mut wtxn, key)
                        .map_err(|e| self.fault("delete", e))?;
                }
            }
        }
        wtxn.commit().map_err(|e| self.fault("commit", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();

        assert_eq!(store.get("zone/Europe/Paris").unwrap(), None);

        store.put("zone/Europe/Paris", "BEGIN:VTIMEZONE").unwrap();
        assert_eq!(
            store.get("zone/Europe/Paris").unwrap().as_deref(),
            Some("BEGIN:VTIMEZONE")
        );

        assert!(store.delete("zone/Europe/Paris").unwrap());
        assert!(!store.delete("zone/Europe/Paris").unwrap());
        assert_eq!(store.get("zone/Europe/Paris").unwrap(), None);
    }

    #[test]
    fn test_prefix_iteration_is_ordered_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();

        store.put("zone/B", "b").unwrap();
        store.put("zone/A", "a").unwrap();
        store.put("zonemod/A", "2024-01-01T00:00:00Z").unwrap();
        store.put("alias/X", "A").unwrap();

        let zones = store.iterate(ZONE_PREFIX).unwrap();
        assert_eq!(
            zones,
            vec![
                ("zone/A".to_string(), "a".to_string()),
                ("zone/B".to_string(), "b".to_string()),
            ]
        );
        assert_eq!(store.zone_count().unwrap(), 2);
        assert_eq!(store.iterate(ALIAS_PREFIX).unwrap().len(), 1);
    }

    #[test]
    fn test_write_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        store.put("zone/Old", "old").unwrap();

        store
            .write_batch(&[
                ("zone/New".to_string(), Some("new".to_string())),
                ("zone/Old".to_string(), None),
            ])
            .unwrap();

        assert_eq!(store.get("zone/New").unwrap().as_deref(), Some("new"));
        assert_eq!(store.get("zone/Old").unwrap(), None);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LmdbStore::open(dir.path()).unwrap();
            store.put(DTSTAMP_KEY, "2024-01-01T00:00:00Z").unwrap();
        }
        let store = LmdbStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get(DTSTAMP_KEY).unwrap().as_deref(),
            Some("2024-01-01T00:00:00Z")
        );

        store.clear().unwrap();
        assert_eq!(store.get(DTSTAMP_KEY).unwrap(), None);
    }
}
