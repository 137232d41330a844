// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable queue of batches awaiting acknowledgement.
//!
//! A batch is written under a fresh key right before it is sent and removed
//! once the intake accepts it. Whatever is still stored at startup was never
//! acknowledged and gets replayed.
//!
//! Keys look like `structured-log-betterstack-sink-<epoch-millis>-<random>`,
//! so the queue can share a store with unrelated entries.

use crate::error::StorageError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Namespace for every key the sink writes.
pub const KEY_PREFIX: &str = "structured-log-betterstack-sink";

/// Key-value medium backing the queue.
pub trait Storage: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Deletes `key`. Absent keys are not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Returns every entry whose key starts with `prefix`, in no particular order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

/// In-process storage. Survives sink re-construction but not process restarts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Storage for MemoryStorage {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// Sled-backed storage that persists across process restarts.
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    path: PathBuf,
}

impl SledStorage {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // sled does not create intermediate directories automatically.
                fs::create_dir_all(parent)?;
            }
        }
        let db = sled::Config::new().path(&path).open()?;
        Ok(Self { db, path })
    }

    /// Opens a store that lives in memory only; handy in tests.
    pub fn open_ephemeral() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            path: PathBuf::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for SledStorage {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.db.insert(key.as_bytes(), value)?;
        // The entry must survive a crash right after the request goes out.
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut entries = Vec::new();
        for result in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = result?;
            // A lossy key could never be removed again.
            match String::from_utf8(key.to_vec()) {
                Ok(key) => entries.push((key, value.to_vec())),
                Err(_) => warn!("BETTERSTACK | Skipping stored entry with a non UTF-8 key"),
            }
        }
        Ok(entries)
    }
}

/// A persisted batch that has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub key: String,
    pub payload: String,
}

/// Namespaced view over a [`Storage`] holding serialized batches.
#[derive(Clone)]
pub struct DurableQueue {
    storage: Arc<dyn Storage>,
    prefix: String,
}

impl DurableQueue {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_prefix(storage, KEY_PREFIX)
    }

    #[must_use]
    pub fn with_prefix(storage: Arc<dyn Storage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>-<epoch-millis>-<random>`. Collisions are possible but negligible.
    #[must_use]
    pub fn generate_key(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        format!("{}-{}-{}", self.prefix, millis, fastrand::u32(..))
    }

    pub fn put(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        self.storage.put(key, payload.as_bytes())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage.remove(key)
    }

    /// Every namespaced entry. Values that are not UTF-8 cannot be a batch
    /// this sink wrote and are skipped.
    pub fn list_pending(&self) -> Result<Vec<PendingBatch>, StorageError> {
        let namespace = format!("{}-", self.prefix);
        let mut pending = Vec::new();
        for (key, value) in self.storage.scan_prefix(&namespace)? {
            match String::from_utf8(value) {
                Ok(payload) => pending.push(PendingBatch { key, payload }),
                Err(_) => warn!("BETTERSTACK | Skipping pending batch {key}: payload is not UTF-8"),
            }
        }
        Ok(pending)
    }
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
