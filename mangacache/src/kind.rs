//! Cache kinds, namespaced keys and the TTL policy table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Resolution kind a cache key belongs to; each kind has its own TTL class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Set of available collection ids
    Directory,
    /// One collection's metadata record
    Manifest,
    /// One collection's ordered chapter list
    ChapterList,
    /// One chapter's resolved content (pattern, pages or PDF url)
    ChapterContent,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::Directory,
        CacheKind::Manifest,
        CacheKind::ChapterList,
        CacheKind::ChapterContent,
    ];

    /// Namespace prefix used in rendered keys
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Directory => "directory",
            CacheKind::Manifest => "manifest",
            CacheKind::ChapterList => "chapters",
            CacheKind::ChapterContent => "content",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(CacheKind::Directory),
            "manifest" => Ok(CacheKind::Manifest),
            "chapters" => Ok(CacheKind::ChapterList),
            "content" => Ok(CacheKind::ChapterContent),
            other => Err(format!("unknown cache kind '{}'", other)),
        }
    }
}

/// A cache key, namespaced by kind and by the collection/chapter it describes
///
/// Rendered forms:
/// - `directory`
/// - `manifest:{collection}`
/// - `chapters:{collection}`
/// - `content:{collection}:{chapter}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: CacheKind,
    collection: Option<String>,
    chapter: Option<u32>,
}

impl CacheKey {
    pub fn directory() -> Self {
        Self {
            kind: CacheKind::Directory,
            collection: None,
            chapter: None,
        }
    }

    pub fn manifest(collection: &str) -> Self {
        Self {
            kind: CacheKind::Manifest,
            collection: Some(collection.to_string()),
            chapter: None,
        }
    }

    pub fn chapter_list(collection: &str) -> Self {
        Self {
            kind: CacheKind::ChapterList,
            collection: Some(collection.to_string()),
            chapter: None,
        }
    }

    pub fn chapter_content(collection: &str, chapter: u32) -> Self {
        Self {
            kind: CacheKind::ChapterContent,
            collection: Some(collection.to_string()),
            chapter: Some(chapter),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Collection namespace segment, `None` for collection-independent keys
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn chapter(&self) -> Option<u32> {
        self.chapter
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(collection) = &self.collection {
            write!(f, ":{}", collection)?;
        }
        if let Some(chapter) = self.chapter {
            write!(f, ":{}", chapter)?;
        }
        Ok(())
    }
}

/// Fixed TTL lookup table, one entry per [`CacheKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    directory: Duration,
    manifest: Duration,
    chapter_list: Duration,
    chapter_content: Duration,
}

impl TtlPolicy {
    pub fn ttl(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Directory => self.directory,
            CacheKind::Manifest => self.manifest,
            CacheKind::ChapterList => self.chapter_list,
            CacheKind::ChapterContent => self.chapter_content,
        }
    }

    /// Returns a copy of the policy with one kind overridden
    pub fn with_ttl(mut self, kind: CacheKind, ttl: Duration) -> Self {
        match kind {
            CacheKind::Directory => self.directory = ttl,
            CacheKind::Manifest => self.manifest = ttl,
            CacheKind::ChapterList => self.chapter_list = ttl,
            CacheKind::ChapterContent => self.chapter_content = ttl,
        }
        self
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            directory: Duration::from_secs(24 * 3600), // 24 hours
            manifest: Duration::from_secs(3600),       // 1 hour
            chapter_list: Duration::from_secs(1800),   // 30 minutes
            chapter_content: Duration::from_secs(600), // 10 minutes
        }
    }
}
