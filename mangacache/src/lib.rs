//! # mangacache - Resolution cache for MangaShelf
//!
//! Persistent key/value cache with one expiry policy per kind of resolved
//! data:
//!
//! | Kind | Key | TTL |
//! |---|---|---|
//! | Directory listing | `directory` | 24 hours |
//! | Collection manifest | `manifest:{id}` | 1 hour |
//! | Chapter list | `chapters:{id}` | 30 minutes |
//! | Chapter content | `content:{id}:{n}` | 10 minutes |
//!
//! Every key carries the collection it describes, so
//! [`CacheStore::invalidate`] drops one collection without touching others.
//!
//! ```rust,no_run
//! use mangacache::{CacheKey, CacheStore, SqliteStorage};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let storage = SqliteStorage::in_dir(Path::new(".mangashelf/cache"))?;
//! let store = CacheStore::new(Arc::new(storage));
//!
//! store.set_json(&CacheKey::directory(), &vec!["naruto".to_string()]);
//! let ids: Option<Vec<String>> = store.get_json(&CacheKey::directory());
//! # Ok::<(), mangacache::CacheError>(())
//! ```

pub mod backend;
pub mod clock;
pub mod error;
pub mod kind;
pub mod sqlite;
pub mod store;

pub use backend::{CacheEntry, MemoryStorage, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use kind::{CacheKey, CacheKind, TtlPolicy};
pub use sqlite::SqliteStorage;
pub use store::{CacheStats, CacheStore};
