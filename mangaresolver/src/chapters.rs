//! Chapter list resolution
//!
//! Manifests are authoritative when present. Otherwise chapter numbers are
//! probed in small concurrent batches from 1 upward, and probing stops early:
//!
//! - once `chapter_min_found` chapters are known after a batch,
//! - after a batch that found nothing,
//! - at `chapter_probe_limit`.
//!
//! Chapters beyond an early stop are discovered when navigated to, see
//! [`ChapterListResolver::discover_chapter`].

use crate::models::{Chapter, ChapterContent};
use crate::paths::{Bucket, ContentPaths};
use crate::naming::NamePattern;
use crate::records::{parse_chapter_list, parse_chapter};
use crate::settings::ResolverSettings;
use crate::source::{fetch_json_within, ContentSource};
use futures::future::join_all;
use mangacache::{CacheKey, CacheStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Marker a probed chapter directory was recognized by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChapterMarker {
    PageIndex,
    FirstPage,
    FirstBucket,
}

pub struct ChapterListResolver {
    source: Arc<dyn ContentSource>,
    cache: Arc<CacheStore>,
    paths: ContentPaths,
    listing_timeout: Duration,
    batch_size: usize,
    min_found: usize,
    probe_limit: u32,
    bucket_size: u32,
}

impl ChapterListResolver {
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: Arc<CacheStore>,
        settings: &ResolverSettings,
    ) -> Self {
        Self {
            source,
            cache,
            paths: settings.paths(),
            listing_timeout: settings.listing_timeout,
            batch_size: settings.chapter_batch_size.max(1),
            min_found: settings.chapter_min_found,
            probe_limit: settings.chapter_probe_limit,
            bucket_size: settings.bucket_size.max(1),
        }
    }

    pub(crate) fn paths(&self) -> &ContentPaths {
        &self.paths
    }

    /// Ordered chapter list, possibly empty
    ///
    /// Numbers are unique and strictly ascending. Only non-empty lists are
    /// cached.
    pub async fn resolve_chapters(&self, id: &str) -> Vec<Chapter> {
        if let Some(chapters) = self.manifest_chapters(id).await {
            return chapters;
        }

        let chapters = self.probe_chapters(id).await;
        if !chapters.is_empty() {
            self.cache.set_json(&CacheKey::chapter_list(id), &chapters);
        }
        chapters
    }

    /// Chapter list from the cache or a manifest, without directory probing
    ///
    /// Used by page resolution to look for explicit chapter data cheaply.
    pub async fn manifest_chapters(&self, id: &str) -> Option<Vec<Chapter>> {
        let key = CacheKey::chapter_list(id);
        if let Some(chapters) = self.cache.get_json::<Vec<Chapter>>(&key) {
            debug!(collection = %id, count = chapters.len(), "Chapter list from cache");
            return Some(chapters);
        }

        let mut chapters = self.from_backend(id).await;
        if chapters.is_none() {
            chapters = self.from_manifest_file(id).await;
        }

        let chapters = chapters.filter(|list| !list.is_empty())?;
        info!(collection = %id, count = chapters.len(), "Chapter list from manifest");
        self.cache.set_json(&key, &chapters);
        Some(chapters)
    }

    /// One chapter as described by the backend
    pub(crate) async fn backend_chapter(&self, id: &str, number: u32) -> Option<Chapter> {
        let url = self.paths.api_chapter(id, number)?;
        match fetch_json_within(self.source.as_ref(), &url, self.listing_timeout).await {
            Ok(payload) => parse_chapter(payload, id, &self.paths),
            Err(e) => {
                debug!(url = %url, error = %e, "Backend chapter unavailable");
                None
            }
        }
    }

    async fn from_backend(&self, id: &str) -> Option<Vec<Chapter>> {
        let url = self.paths.api_chapters(id)?;
        match fetch_json_within(self.source.as_ref(), &url, self.listing_timeout).await {
            Ok(payload) => parse_chapter_list(payload, id, &self.paths),
            Err(e) => {
                debug!(url = %url, error = %e, "Backend chapter list unavailable");
                None
            }
        }
    }

    async fn from_manifest_file(&self, id: &str) -> Option<Vec<Chapter>> {
        let url = self.paths.chapter_manifest(id);
        match self.source.fetch_json(&url).await {
            Ok(payload) => parse_chapter_list(payload, id, &self.paths),
            Err(e) => {
                debug!(url = %url, error = %e, "No chapter manifest");
                None
            }
        }
    }

    async fn probe_chapters(&self, id: &str) -> Vec<Chapter> {
        let mut found: Vec<Chapter> = Vec::new();
        let mut next = 1u32;

        while next <= self.probe_limit {
            let last = next
                .saturating_add(self.batch_size as u32 - 1)
                .min(self.probe_limit);
            let hits: Vec<Chapter> = join_all((next..=last).map(|n| self.probe_chapter(id, n)))
                .await
                .into_iter()
                .flatten()
                .collect();

            debug!(collection = %id, from = next, to = last, hits = hits.len(), "Probed chapter batch");
            let batch_empty = hits.is_empty();
            found.extend(hits);

            if found.len() >= self.min_found || batch_empty {
                break;
            }
            next = last + 1;
        }

        info!(collection = %id, count = found.len(), "Chapter list from probing");
        found
    }

    /// Probes one chapter directory; markers are tried in order
    async fn probe_chapter(&self, id: &str, number: u32) -> Option<Chapter> {
        let marker = self.find_marker(id, number).await?;
        Some(Chapter {
            collection_id: id.to_string(),
            number,
            title: Chapter::default_title(number),
            base_path: self.paths.chapter_dir(id, number),
            bucketed: marker == ChapterMarker::FirstBucket,
            content: ChapterContent::default(),
        })
    }

    async fn find_marker(&self, id: &str, number: u32) -> Option<ChapterMarker> {
        let first_bucket = Bucket::nth(0, self.bucket_size);
        let markers = [
            (ChapterMarker::PageIndex, self.paths.chapter_index(id, number)),
            (
                ChapterMarker::FirstPage,
                self.paths.page(id, number, NamePattern::Padded3, 1, "jpg"),
            ),
            (
                ChapterMarker::FirstBucket,
                self.paths.bucket_page(id, number, &first_bucket, first_bucket.start, "jpg"),
            ),
        ];
        for (marker, url) in markers {
            if self.source.exists(&url).await {
                return Some(marker);
            }
        }
        None
    }

    /// Checks a chapter absent from the known list and records it when found
    ///
    /// The current list (resolved again if its cache entry is gone) is
    /// extended and cached so that later navigation sees the chapter without
    /// probing again.
    pub async fn discover_chapter(&self, id: &str, number: u32) -> Option<Chapter> {
        if number == 0 || number > self.probe_limit {
            return None;
        }
        let chapter = self.probe_chapter(id, number).await?;

        let mut chapters = self.resolve_chapters(id).await;
        if let Err(position) = chapters.binary_search_by_key(&number, |c| c.number) {
            chapters.insert(position, chapter.clone());
            self.cache.set_json(&CacheKey::chapter_list(id), &chapters);
        }
        debug!(collection = %id, chapter = number, "Discovered chapter");
        Some(chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use mangacache::ManualClock;
    use serde_json::json;

    const BASE: &str = "http://h/data/manga";

    fn resolver(source: Arc<StaticSource>) -> ChapterListResolver {
        ChapterListResolver::new(
            source,
            Arc::new(CacheStore::in_memory()),
            &ResolverSettings::new(BASE),
        )
    }

    fn first_page(id: &str, n: u32) -> String {
        format!("{}/{}/chapters/{}/001.jpg", BASE, id, n)
    }

    #[tokio::test]
    async fn test_manifest_is_authoritative() {
        let source = Arc::new(
            StaticSource::new()
                .with_json(format!("{}/x/chapters.json", BASE), json!([{"number": 2}, {"number": 1}]))
                .with_file(first_page("x", 3)),
        );
        let numbers: Vec<u32> = resolver(source)
            .resolve_chapters("x")
            .await
            .iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_probing_stops_after_first_batch_with_enough_hits() {
        let source = Arc::new(StaticSource::new());
        for n in 1..=20 {
            source.add_file(first_page("x", n));
        }
        let chapters = resolver(source).resolve_chapters("x").await;
        let numbers: Vec<u32> = chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, (1..=7).collect::<Vec<_>>());
        assert_eq!(chapters[0].title, "Chapter 1");
    }

    #[tokio::test]
    async fn test_probing_stops_on_empty_batch() {
        let source = Arc::new(StaticSource::new().with_file(first_page("x", 1)));
        let resolver = resolver(source.clone());

        let chapters = resolver.resolve_chapters("x").await;
        assert_eq!(chapters.len(), 1);

        // Second batch (8..=14) found nothing; nothing beyond 14 was probed
        assert!(!source.requests().iter().any(|u| u.contains("/chapters/15/")));
    }

    #[tokio::test]
    async fn test_bucketed_marker() {
        let source = Arc::new(
            StaticSource::new()
                .with_file(format!("{}/x/chapters/1/pages_001_100/001.jpg", BASE)),
        );
        let chapters = resolver(source).resolve_chapters("x").await;
        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].bucketed);
    }

    #[tokio::test]
    async fn test_discover_chapter_extends_cached_list() {
        let source = Arc::new(StaticSource::new());
        for n in 1..=9 {
            source.add_file(first_page("x", n));
        }
        let resolver = resolver(source);
        assert_eq!(resolver.resolve_chapters("x").await.len(), 7);

        assert!(resolver.discover_chapter("x", 8).await.is_some());
        assert!(resolver.discover_chapter("x", 12).await.is_none());

        let numbers: Vec<u32> = resolver
            .resolve_chapters("x")
            .await
            .iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(numbers, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_discover_chapter_after_list_expired() {
        let source = Arc::new(StaticSource::new());
        for n in 1..=9 {
            source.add_file(first_page("x", n));
        }
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(CacheStore::in_memory().with_clock(clock.clone()));
        let resolver = ChapterListResolver::new(source, cache, &ResolverSettings::new(BASE));
        assert_eq!(resolver.resolve_chapters("x").await.len(), 7);

        clock.advance(Duration::from_secs(31 * 60));
        assert!(resolver.discover_chapter("x", 8).await.is_some());

        let numbers: Vec<u32> = resolver
            .resolve_chapters("x")
            .await
            .iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(numbers, (1..=8).collect::<Vec<_>>());
    }
}
