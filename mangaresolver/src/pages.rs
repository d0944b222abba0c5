//! Chapter content resolution
//!
//! Content is determined tier by tier, each tier ending the resolution when it
//! succeeds:
//!
//! 1. cached content,
//! 2. explicit chapter data (chapter manifest, backend chapter, per-chapter
//!    `index.json`),
//! 3. a volume PDF,
//! 4. bucket directories (`pages_001_100/001.jpg`),
//! 5. the first flat page under each naming pattern and extension, followed
//!    by extent discovery,
//! 6. a bounded brute force over a reduced pattern and extension set.
//!
//! Only successful resolutions are cached. Dropping the future cancels the
//! resolution before anything is written.

use crate::chapters::ChapterListResolver;
use crate::extent::discover_extent;
use crate::models::{Chapter, ChapterContent, ImagePages};
use crate::naming::{order_page_groups, order_pages, NamePattern, IMAGE_EXTENSIONS};
use crate::paths::{Bucket, BucketNumbering, ContentPaths, PdfName, BUCKET_EXTENSION};
use crate::records::ChapterIndexRecord;
use crate::settings::ResolverSettings;
use crate::source::ContentSource;
use futures::stream::{self, StreamExt};
use indexmap::IndexSet;
use mangacache::{CacheKey, CacheStore};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Patterns and extensions tried by the brute-force fallback
const BRUTE_FORCE_WIDTH: usize = 3;

/// State of one chapter resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePhase {
    Idle,
    ResolvingManifest,
    ProbingPattern,
    DiscoveringExtent,
    BruteForcing,
    Ready,
    Error,
}

impl fmt::Display for ResolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolvePhase::Idle => "idle",
            ResolvePhase::ResolvingManifest => "resolving_manifest",
            ResolvePhase::ProbingPattern => "probing_pattern",
            ResolvePhase::DiscoveringExtent => "discovering_extent",
            ResolvePhase::BruteForcing => "brute_forcing",
            ResolvePhase::Ready => "ready",
            ResolvePhase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Phases a resolution went through, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveTrace {
    pub collection_id: String,
    pub chapter: u32,
    pub phases: Vec<ResolvePhase>,
}

impl ResolveTrace {
    fn new(collection_id: &str, chapter: u32) -> Self {
        Self {
            collection_id: collection_id.to_string(),
            chapter,
            phases: vec![ResolvePhase::Idle],
        }
    }

    fn enter(&mut self, phase: ResolvePhase) {
        debug!(
            collection = %self.collection_id,
            chapter = self.chapter,
            from = %self.phase(),
            to = %phase,
            "Resolution phase"
        );
        self.phases.push(phase);
    }

    /// Current phase
    pub fn phase(&self) -> ResolvePhase {
        self.phases.last().copied().unwrap_or(ResolvePhase::Idle)
    }

    /// True when the phase sequence is a legal path through the state machine
    pub fn is_valid(&self) -> bool {
        use ResolvePhase::*;
        self.phases.windows(2).all(|step| {
            matches!(
                (step[0], step[1]),
                (Idle, ResolvingManifest)
                    | (Idle, Ready)
                    | (ResolvingManifest, Ready)
                    | (ResolvingManifest, ProbingPattern)
                    | (ProbingPattern, DiscoveringExtent)
                    | (ProbingPattern, BruteForcing)
                    | (DiscoveringExtent, Ready)
                    | (BruteForcing, Ready)
                    | (BruteForcing, Error)
            )
        })
    }
}

/// What is already known about a chapter before probing it
struct ChapterHint {
    title: String,
    base_path: String,
    bucketed: bool,
}

pub struct PageResolver {
    source: Arc<dyn ContentSource>,
    cache: Arc<CacheStore>,
    chapters: Arc<ChapterListResolver>,
    paths: ContentPaths,
    extent_cap: u32,
    bucket_size: u32,
    max_buckets: u32,
    brute_force_max_index: u32,
    brute_force_concurrency: usize,
}

impl PageResolver {
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: Arc<CacheStore>,
        chapters: Arc<ChapterListResolver>,
        settings: &ResolverSettings,
    ) -> Self {
        Self {
            source,
            cache,
            paths: chapters.paths().clone(),
            chapters,
            extent_cap: settings.extent_cap.max(1),
            bucket_size: settings.bucket_size.max(1),
            max_buckets: settings.max_buckets,
            brute_force_max_index: settings.brute_force_max_index,
            brute_force_concurrency: settings.brute_force_concurrency.max(1),
        }
    }

    /// Resolves a chapter's content, `None` when nothing was found
    ///
    /// A returned image chapter always has at least one page. Pages are
    /// ordered by page numeral within each bucket or page group, and groups
    /// keep their own order.
    pub async fn resolve_chapter_pages(&self, id: &str, number: u32) -> Option<Chapter> {
        self.resolve_chapter_pages_traced(id, number).await.0
    }

    /// Same as [`PageResolver::resolve_chapter_pages`], also returning the
    /// phases the resolution went through
    pub async fn resolve_chapter_pages_traced(
        &self,
        id: &str,
        number: u32,
    ) -> (Option<Chapter>, ResolveTrace) {
        let mut trace = ResolveTrace::new(id, number);
        let key = CacheKey::chapter_content(id, number);

        if let Some(chapter) = self.cache.get_json::<Chapter>(&key) {
            debug!(collection = %id, chapter = number, "Chapter content from cache");
            trace.enter(ResolvePhase::Ready);
            return (Some(chapter), trace);
        }

        trace.enter(ResolvePhase::ResolvingManifest);
        let (hint, explicit) = self.from_chapter_data(id, number).await;
        let mut resolved = explicit;
        if resolved.is_none() {
            resolved = self.from_page_index(id, number, &hint).await;
        }
        if resolved.is_none() {
            resolved = self.from_pdf(id, number, &hint).await;
        }

        if resolved.is_none() {
            trace.enter(ResolvePhase::ProbingPattern);
            resolved = self.from_patterns(id, number, &hint, &mut trace).await;
        }

        let Some(chapter) = resolved else {
            trace.enter(ResolvePhase::Error);
            warn!(collection = %id, chapter = number, "No content found for chapter");
            return (None, trace);
        };

        trace.enter(ResolvePhase::Ready);
        info!(
            collection = %id,
            chapter = number,
            content = ?chapter.content_type(),
            pages = chapter.pages().len(),
            "Resolved chapter content"
        );
        self.cache.set_json(&key, &chapter);
        (Some(chapter), trace)
    }

    fn chapter(&self, id: &str, number: u32, hint: &ChapterHint, content: ChapterContent) -> Chapter {
        Chapter {
            collection_id: id.to_string(),
            number,
            title: hint.title.clone(),
            base_path: hint.base_path.clone(),
            bucketed: hint.bucketed,
            content,
        }
    }

    /// Looks the chapter up in the chapter manifest, then asks the backend
    async fn from_chapter_data(&self, id: &str, number: u32) -> (ChapterHint, Option<Chapter>) {
        let listed = self
            .chapters
            .manifest_chapters(id)
            .await
            .and_then(|chapters| chapters.into_iter().find(|c| c.number == number));

        let hint = match &listed {
            Some(chapter) => ChapterHint {
                title: chapter.title.clone(),
                base_path: chapter.base_path.clone(),
                bucketed: chapter.bucketed,
            },
            None => ChapterHint {
                title: Chapter::default_title(number),
                base_path: self.paths.chapter_dir(id, number),
                bucketed: false,
            },
        };

        if let Some(chapter) = listed.filter(Chapter::is_resolved) {
            debug!(collection = %id, chapter = number, "Content from chapter manifest");
            return (hint, Some(chapter));
        }
        if let Some(chapter) = self.chapters.backend_chapter(id, number).await {
            if chapter.is_resolved() {
                debug!(collection = %id, chapter = number, "Content from backend");
                return (hint, Some(chapter));
            }
        }
        (hint, None)
    }

    /// Per-chapter page index; the first listed page must exist
    async fn from_page_index(&self, id: &str, number: u32, hint: &ChapterHint) -> Option<Chapter> {
        let url = format!("{}/index.json", hint.base_path);
        let record = match self.source.fetch_json(&url).await {
            Ok(payload) => match serde_json::from_value::<ChapterIndexRecord>(payload) {
                Ok(record) => record,
                Err(e) => {
                    warn!(url = %url, error = %e, "Unusable page index");
                    return None;
                }
            },
            Err(e) => {
                debug!(url = %url, error = %e, "No page index");
                return None;
            }
        };

        let pages = order_page_groups(record.references().into_iter().map(|group| {
            group
                .into_iter()
                .map(|reference| self.paths.resolve_reference(&hint.base_path, &reference))
                .collect::<Vec<_>>()
        }));
        let first = pages.first()?;
        if !self.source.exists(first).await {
            warn!(url = %url, first = %first, "Page index points to missing pages");
            return None;
        }
        debug!(collection = %id, chapter = number, pages = pages.len(), "Content from page index");
        Some(self.chapter(id, number, hint, ChapterContent::Images(ImagePages::listed(pages))))
    }

    async fn from_pdf(&self, id: &str, number: u32, hint: &ChapterHint) -> Option<Chapter> {
        for name in PdfName::ALL {
            let url = self.paths.pdf(id, number, name);
            if self.source.exists(&url).await {
                debug!(collection = %id, chapter = number, url = %url, "Found volume PDF");
                return Some(self.chapter(id, number, hint, ChapterContent::Pdf { url }));
            }
        }
        None
    }

    /// Bucketed layout first, then flat naming patterns, then brute force
    async fn from_patterns(
        &self,
        id: &str,
        number: u32,
        hint: &ChapterHint,
        trace: &mut ResolveTrace,
    ) -> Option<Chapter> {
        let first_bucket = Bucket::nth(0, self.bucket_size);
        let marker = self
            .paths
            .bucket_page(id, number, &first_bucket, first_bucket.start, BUCKET_EXTENSION);
        if self.source.exists(&marker).await {
            trace.enter(ResolvePhase::DiscoveringExtent);
            let pages = self.collect_buckets(id, number).await;
            let hint = ChapterHint {
                title: hint.title.clone(),
                base_path: hint.base_path.clone(),
                bucketed: true,
            };
            let images = ImagePages::patterned(Some(NamePattern::Padded3), BUCKET_EXTENSION, pages);
            return Some(self.chapter(id, number, &hint, ChapterContent::Images(images)));
        }

        if let Some((pattern, ext)) = self.detect_pattern(id, number).await {
            trace.enter(ResolvePhase::DiscoveringExtent);
            let count = discover_extent(self.source.as_ref(), 1, self.extent_cap, |page| {
                self.paths.page(id, number, pattern, page, ext)
            })
            .await;
            let pages = (1..=count)
                .map(|page| self.paths.page(id, number, pattern, page, ext))
                .collect();
            debug!(collection = %id, chapter = number, %pattern, ext, count, "Flat pages");
            let images = ImagePages::patterned(Some(pattern), ext, pages);
            return Some(self.chapter(id, number, hint, ChapterContent::Images(images)));
        }

        trace.enter(ResolvePhase::BruteForcing);
        let pages = self.brute_force(id, number).await;
        if pages.is_empty() {
            return None;
        }
        Some(self.chapter(
            id,
            number,
            hint,
            ChapterContent::Images(ImagePages::listed(pages)),
        ))
    }

    /// First page under each pattern and extension, in order
    async fn detect_pattern(&self, id: &str, number: u32) -> Option<(NamePattern, &'static str)> {
        for pattern in NamePattern::ALL {
            for ext in IMAGE_EXTENSIONS {
                if self.source.exists(&self.paths.page(id, number, pattern, 1, ext)).await {
                    debug!(collection = %id, chapter = number, %pattern, ext, "Detected naming pattern");
                    return Some((pattern, ext));
                }
            }
        }
        None
    }

    /// Pages of consecutive buckets, in bucket order
    ///
    /// Each bucket's first page is its marker, named after the bucket's
    /// numbering (global, or restarting at `001`). A bucket that is not full,
    /// or whose successor has no marker, is the last one.
    async fn collect_buckets(&self, id: &str, number: u32) -> Vec<String> {
        let mut pages = Vec::new();
        for index in 0..self.max_buckets {
            let bucket = Bucket::nth(index, self.bucket_size);
            let url_for =
                |page: u32| self.paths.bucket_page(id, number, &bucket, page, BUCKET_EXTENSION);

            // The first marker was checked by the caller, and both numberings
            // agree on it
            let numbering = if index == 0 {
                BucketNumbering::Global
            } else {
                match self.bucket_numbering(&bucket, url_for).await {
                    Some(numbering) => numbering,
                    None => break,
                }
            };
            let (first, cap) = bucket.numerals(numbering);
            let last = discover_extent(self.source.as_ref(), first, cap, url_for).await;
            debug!(
                collection = %id,
                chapter = number,
                bucket = %bucket.name(),
                ?numbering,
                last,
                "Bucket extent"
            );
            pages.extend((first..=last).map(url_for));
            if last < cap {
                break;
            }
        }
        pages
    }

    /// Numbering whose marker exists in `bucket`, global first
    async fn bucket_numbering<F>(&self, bucket: &Bucket, url_for: F) -> Option<BucketNumbering>
    where
        F: Fn(u32) -> String,
    {
        for numbering in BucketNumbering::ALL {
            let (first, _) = bucket.numerals(numbering);
            if self.source.exists(&url_for(first)).await {
                return Some(numbering);
            }
        }
        None
    }

    /// Probes a small fixed set of names concurrently, keeping what exists
    ///
    /// Results are ordered by page numeral, one page per numeral.
    async fn brute_force(&self, id: &str, number: u32) -> Vec<String> {
        let mut candidates: IndexSet<String> = IndexSet::new();
        for pattern in NamePattern::ALL.iter().take(BRUTE_FORCE_WIDTH) {
            for ext in IMAGE_EXTENSIONS.iter().take(BRUTE_FORCE_WIDTH) {
                for page in 1..=self.brute_force_max_index {
                    candidates.insert(self.paths.page(id, number, *pattern, page, ext));
                }
            }
        }
        debug!(collection = %id, chapter = number, candidates = candidates.len(), "Brute forcing pages");

        let found: Vec<String> = stream::iter(candidates)
            .map(|url| async move { self.source.exists(&url).await.then_some(url) })
            .buffer_unordered(self.brute_force_concurrency)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;
        order_pages(found)
    }
}
