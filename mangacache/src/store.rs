//! `CacheStore`: TTL-keyed cache shared by every resolver

use crate::backend::{CacheEntry, MemoryStorage, StorageBackend};
use crate::clock::{Clock, SystemClock};
use crate::kind::{CacheKey, CacheKind, TtlPolicy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache with per-kind expiry over an injected storage backend
///
/// A read is a hit iff `now - stored_at < ttl(kind)`. Backend failures are
/// logged and turned into misses, so callers never see an error.
///
/// The bypass set lists collection ids that always read as a miss; it is a
/// revocable escape hatch for records known to be stale, not a feature to
/// build on.
pub struct CacheStore {
    backend: Arc<dyn StorageBackend>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    bypass: RwLock<HashSet<String>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            policy: TtlPolicy::default(),
            clock: Arc::new(SystemClock),
            bypass: RwLock::new(HashSet::new()),
        }
    }

    /// Store backed by process memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn with_policy(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_bypass<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut bypass = self.bypass.write().unwrap();
            bypass.extend(ids.into_iter().map(Into::into));
        }
        self
    }

    pub fn ttl(&self, kind: CacheKind) -> Duration {
        self.policy.ttl(kind)
    }

    /// Adds a collection id to the always-miss set
    pub fn add_bypass(&self, collection: &str) {
        self.bypass.write().unwrap().insert(collection.to_string());
    }

    /// Removes a collection id from the always-miss set
    pub fn revoke_bypass(&self, collection: &str) -> bool {
        self.bypass.write().unwrap().remove(collection)
    }

    pub fn bypassed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.bypass.read().unwrap().iter().cloned().collect();
        ids.sort();
        ids
    }

    fn is_bypassed(&self, key: &CacheKey) -> bool {
        match key.collection() {
            Some(collection) => self.bypass.read().unwrap().contains(collection),
            None => false,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        // An entry stamped in the future counts as brand new
        let age = (self.clock.now() - entry.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age < self.policy.ttl(entry.kind)
    }

    /// Returns the cached value for `key`, or `None` when absent, expired,
    /// bypassed or unreadable
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        if self.is_bypassed(key) {
            debug!(key = %key, "Cache bypassed");
            return None;
        }

        let rendered = key.to_string();
        let entry = match self.backend.load(&rendered) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(key = %rendered, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %rendered, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if !self.is_fresh(&entry) {
            debug!(key = %rendered, stored_at = %entry.stored_at, "Cache entry expired");
            return None;
        }

        match serde_json::from_str(&entry.value) {
            Ok(value) => {
                debug!(key = %rendered, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %rendered, error = %e, "Corrupted cache value, treating as miss");
                None
            }
        }
    }

    /// Typed variant of [`CacheStore::get`]
    pub fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has an unexpected shape");
                None
            }
        }
    }

    /// Writes `value` under `key`, stamped with the current time
    pub fn set(&self, key: &CacheKey, value: &Value) {
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
            stored_at: self.clock.now(),
            kind: key.kind(),
            collection: key.collection().map(str::to_string),
        };
        if let Err(e) = self.backend.store(entry) {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// Typed variant of [`CacheStore::set`]
    pub fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(encoded) => self.set(key, &encoded),
            Err(e) => warn!(key = %key, error = %e, "Value not serializable, not cached"),
        }
    }

    /// Removes one key
    pub fn remove(&self, key: &CacheKey) {
        if let Err(e) = self.backend.remove(&key.to_string()) {
            warn!(key = %key, error = %e, "Cache remove failed");
        }
    }

    /// Removes every key whose collection segment equals `collection`
    ///
    /// Keys of other collections and collection-independent keys (the
    /// directory listing) are untouched.
    pub fn invalidate(&self, collection: &str) -> usize {
        match self.backend.remove_collection(collection) {
            Ok(removed) => {
                info!(collection = %collection, removed, "Invalidated cache");
                removed
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    /// Deletes expired rows of every kind
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for kind in CacheKind::ALL {
            let Ok(ttl) = chrono::Duration::from_std(self.policy.ttl(kind)) else {
                continue;
            };
            let Some(cutoff) = now.checked_sub_signed(ttl) else {
                continue;
            };
            // `stored_at <= cutoff` is already expired, hence the extra millisecond
            let cutoff = cutoff + chrono::Duration::milliseconds(1);
            match self.backend.remove_stored_before(kind, cutoff) {
                Ok(n) => removed += n,
                Err(e) => warn!(kind = %kind, error = %e, "Purge failed"),
            }
        }
        if removed > 0 {
            info!(removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.clear() {
            warn!(error = %e, "Cache clear failed");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let counts = match self.backend.count_by_kind() {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Cache stats unavailable");
                Default::default()
            }
        };
        let count = |kind| counts.get(&kind).copied().unwrap_or(0);
        CacheStats {
            directory_count: count(CacheKind::Directory),
            manifest_count: count(CacheKind::Manifest),
            chapter_list_count: count(CacheKind::ChapterList),
            chapter_content_count: count(CacheKind::ChapterContent),
        }
    }
}

/// Entry counts per kind, fresh or not
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub directory_count: usize,
    pub manifest_count: usize,
    pub chapter_list_count: usize,
    pub chapter_content_count: usize,
}

impl CacheStats {
    pub fn total_count(&self) -> usize {
        self.directory_count
            + self.manifest_count
            + self.chapter_list_count
            + self.chapter_content_count
    }
}
