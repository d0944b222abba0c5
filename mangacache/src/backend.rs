//! Storage backends for the resolution cache
//!
//! A backend only persists rows; expiry is decided by [`crate::CacheStore`]
//! from the stored timestamp and its TTL policy.

use crate::error::Result;
use crate::kind::CacheKind;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One persisted cache row
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Rendered key, e.g. `content:naruto:3`
    pub key: String,
    /// JSON-encoded value
    pub value: String,
    /// Instant the value was written
    pub stored_at: DateTime<Utc>,
    /// TTL class
    pub kind: CacheKind,
    /// Collection namespace segment, used for invalidation
    pub collection: Option<String>,
}

/// Durable key/value storage with a collection index
pub trait StorageBackend: Send + Sync {
    /// Loads the row stored under `key`, fresh or not
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Inserts or replaces a row
    fn store(&self, entry: CacheEntry) -> Result<()>;

    /// Removes one row, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// Removes every row whose collection segment equals `collection`
    ///
    /// Implementations must use their collection index rather than scanning
    /// other namespaces.
    fn remove_collection(&self, collection: &str) -> Result<usize>;

    /// Removes rows of `kind` written strictly before `cutoff`
    fn remove_stored_before(&self, kind: CacheKind, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Number of rows per kind
    fn count_by_kind(&self) -> Result<HashMap<CacheKind, usize>>;

    /// Removes every row
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, CacheEntry>,
    by_collection: HashMap<String, HashSet<String>>,
}

impl MemoryInner {
    fn unlink(&mut self, entry: &CacheEntry) {
        if let Some(collection) = &entry.collection {
            if let Some(keys) = self.by_collection.get_mut(collection) {
                keys.remove(&entry.key);
                if keys.is_empty() {
                    self.by_collection.remove(collection);
                }
            }
        }
    }
}

/// Process-local backend, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.get(key).cloned())
    }

    fn store(&self, entry: CacheEntry) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(previous) = inner.entries.remove(&entry.key) {
            inner.unlink(&previous);
        }
        if let Some(collection) = &entry.collection {
            inner
                .by_collection
                .entry(collection.clone())
                .or_default()
                .insert(entry.key.clone());
        }
        inner.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.remove(key) {
            Some(previous) => {
                inner.unlink(&previous);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_collection(&self, collection: &str) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let Some(keys) = inner.by_collection.remove(collection) else {
            return Ok(0);
        };
        let mut removed = 0;
        for key in keys {
            if inner.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn remove_stored_before(&self, kind: CacheKind, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<CacheEntry> = inner
            .entries
            .values()
            .filter(|e| e.kind == kind && e.stored_at < cutoff)
            .cloned()
            .collect();
        for entry in &stale {
            inner.entries.remove(&entry.key);
            inner.unlink(entry);
        }
        Ok(stale.len())
    }

    fn count_by_kind(&self) -> Result<HashMap<CacheKind, usize>> {
        let inner = self.inner.lock().unwrap();
        let mut counts = HashMap::new();
        for entry in inner.entries.values() {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.by_collection.clear();
        Ok(())
    }
}
