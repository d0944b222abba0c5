//! `MangaService`: one entry point wiring every resolver to a shared cache

use crate::chapters::ChapterListResolver;
use crate::config_ext::{CacheBackendKind, MangaConfigExt};
use crate::directory::DirectoryResolver;
use crate::error::Result;
use crate::loader::{IncrementalPageLoader, LoaderSettings, SourcePreloader};
use crate::manifest::ManifestResolver;
use crate::models::{AdjacentChapters, Chapter, Collection};
use crate::pages::{PageResolver, ResolveTrace};
use crate::settings::ResolverSettings;
use crate::source::{ContentSource, HttpSource};
use mangacache::{CacheStore, MemoryStorage, SqliteStorage, StorageBackend};
use mangaconfig::Config;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct MangaService {
    source: Arc<dyn ContentSource>,
    cache: Arc<CacheStore>,
    directory: DirectoryResolver,
    manifests: ManifestResolver,
    chapters: Arc<ChapterListResolver>,
    pages: PageResolver,
    loader: LoaderSettings,
}

impl MangaService {
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: Arc<CacheStore>,
        settings: &ResolverSettings,
    ) -> Self {
        let chapters = Arc::new(ChapterListResolver::new(
            source.clone(),
            cache.clone(),
            settings,
        ));
        Self {
            directory: DirectoryResolver::new(source.clone(), cache.clone(), settings),
            manifests: ManifestResolver::new(source.clone(), cache.clone(), settings),
            pages: PageResolver::new(source.clone(), cache.clone(), chapters.clone(), settings),
            chapters,
            source,
            cache,
            loader: settings.loader,
        }
    }

    /// Builds the service from the configuration: HTTP source, cache backend
    /// and bypass list included
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.resolver_settings()?;
        Self::from_config_with(config, &settings)
    }

    /// Same as [`MangaService::from_config`] with explicit resolver settings
    pub fn from_config_with(config: &Config, settings: &ResolverSettings) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match config.get_cache_backend()? {
            CacheBackendKind::Sqlite => {
                let dir = config.get_cache_dir()?;
                Arc::new(SqliteStorage::in_dir(Path::new(&dir))?)
            }
            CacheBackendKind::Memory => Arc::new(MemoryStorage::new()),
        };
        let cache = CacheStore::new(backend).with_bypass(config.get_cache_bypass()?);
        let source = HttpSource::new(settings.probe_timeout)?;

        info!(base_url = %settings.base_url, api = ?settings.api_url, "MangaService ready");
        Ok(Self::new(Arc::new(source), Arc::new(cache), settings))
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    pub async fn list_collections(&self) -> Vec<String> {
        self.directory.list_collections().await
    }

    pub async fn resolve_collection(&self, id: &str) -> Collection {
        self.manifests.resolve_collection(id).await
    }

    pub async fn resolve_chapters(&self, id: &str) -> Vec<Chapter> {
        self.chapters.resolve_chapters(id).await
    }

    pub async fn resolve_chapter_pages(&self, id: &str, number: u32) -> Option<Chapter> {
        self.pages.resolve_chapter_pages(id, number).await
    }

    pub async fn resolve_chapter_pages_traced(
        &self,
        id: &str,
        number: u32,
    ) -> (Option<Chapter>, ResolveTrace) {
        self.pages.resolve_chapter_pages_traced(id, number).await
    }

    /// Drops every cached record of one collection
    pub fn invalidate(&self, id: &str) -> usize {
        self.cache.invalidate(id)
    }

    /// Invalidates a collection and resolves its record again
    pub async fn refresh_collection(&self, id: &str) -> Collection {
        self.invalidate(id);
        self.resolve_collection(id).await
    }

    /// Previous and next chapter numbers around `number`
    ///
    /// When the known list ends at `number`, the following chapter is probed
    /// so that navigation can go past a shortened chapter list.
    pub async fn adjacent_chapters(&self, id: &str, number: u32) -> AdjacentChapters {
        let chapters = self.resolve_chapters(id).await;
        let previous = chapters
            .iter()
            .map(|c| c.number)
            .filter(|n| *n < number)
            .max();
        let mut next = chapters
            .iter()
            .map(|c| c.number)
            .filter(|n| *n > number)
            .min();
        if next.is_none() {
            if let Some(following) = number.checked_add(1) {
                next = self
                    .chapters
                    .discover_chapter(id, following)
                    .await
                    .map(|c| c.number);
            }
        }
        AdjacentChapters { previous, next }
    }

    /// Loader over a resolved chapter's pages, warming them through the source
    pub fn page_loader(&self, chapter: &Chapter) -> IncrementalPageLoader {
        let preloader = Arc::new(SourcePreloader::new(self.source.clone()));
        IncrementalPageLoader::for_chapter(chapter, preloader, self.loader)
    }
}
