//! Windowed page loading for the reader view
//!
//! Pages become visible one window at a time. Each window hands out a
//! [`Sentinel`]; reporting it visible loads the next window, and any other
//! report (stale sentinel, load already running) is a no-op. The pages just
//! past the visible window are warmed in the background.

use crate::models::Chapter;
use crate::source::ContentSource;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Pages made visible per window
    pub window_size: usize,
    /// Pages warmed past the visible window
    pub lookahead: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            lookahead: 5,
        }
    }
}

/// Warms one page so that displaying it is instant
#[async_trait]
pub trait Preloader: Send + Sync {
    /// Returns false when the page could not be fetched
    async fn preload(&self, url: &str) -> bool;
}

/// Preloads pages by fetching them through a [`ContentSource`]
pub struct SourcePreloader {
    source: Arc<dyn ContentSource>,
}

impl SourcePreloader {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Preloader for SourcePreloader {
    async fn preload(&self, url: &str) -> bool {
        match self.source.fetch_bytes(url).await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %url, error = %e, "Preload failed");
                false
            }
        }
    }
}

/// Marker placed after the last visible page
///
/// Only the sentinel of the current window triggers a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel {
    window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Pages `start..end` became visible
    Loaded { start: usize, end: usize },
    /// The sentinel belongs to a window that was already loaded
    Stale,
    /// Another load is running
    Busy,
    /// Every page is already visible
    Exhausted,
}

#[derive(Debug, Default)]
struct LoaderState {
    visible: usize,
    windows: usize,
    loading: bool,
    requested: HashSet<String>,
}

/// Clears the loading flag when a load ends, even if it was cancelled
struct LoadingGuard<'a> {
    state: &'a Mutex<LoaderState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.loading = false;
        }
    }
}

pub struct IncrementalPageLoader {
    pages: Vec<String>,
    settings: LoaderSettings,
    preloader: Arc<dyn Preloader>,
    state: Mutex<LoaderState>,
}

impl IncrementalPageLoader {
    pub fn new(pages: Vec<String>, preloader: Arc<dyn Preloader>, settings: LoaderSettings) -> Self {
        Self {
            pages,
            settings: LoaderSettings {
                window_size: settings.window_size.max(1),
                lookahead: settings.lookahead,
            },
            preloader,
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn for_chapter(chapter: &Chapter, preloader: Arc<dyn Preloader>, settings: LoaderSettings) -> Self {
        Self::new(chapter.pages().to_vec(), preloader, settings)
    }

    pub fn total(&self) -> usize {
        self.pages.len()
    }

    /// Pages currently visible, in order
    pub fn visible(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        self.pages[..state.visible].to_vec()
    }

    pub fn visible_count(&self) -> usize {
        self.state.lock().unwrap().visible
    }

    pub fn has_more(&self) -> bool {
        self.visible_count() < self.pages.len()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    /// Number of distinct pages whose preload completed
    pub fn requested_count(&self) -> usize {
        self.state.lock().unwrap().requested.len()
    }

    /// Sentinel of the current window, `None` once every page is visible
    pub fn sentinel(&self) -> Option<Sentinel> {
        let state = self.state.lock().unwrap();
        (state.visible < self.pages.len()).then_some(Sentinel {
            window: state.windows,
        })
    }

    /// Loads the first window
    pub async fn load_initial(&self) -> LoadOutcome {
        self.on_sentinel_visible(Sentinel { window: 0 }).await
    }

    /// Loads the next window if `sentinel` is the current one
    pub async fn on_sentinel_visible(&self, sentinel: Sentinel) -> LoadOutcome {
        let (start, end, window, lookahead) = {
            let mut state = self.state.lock().unwrap();
            if state.loading {
                trace!("Load already running");
                return LoadOutcome::Busy;
            }
            if state.visible >= self.pages.len() {
                return LoadOutcome::Exhausted;
            }
            if sentinel.window != state.windows {
                trace!(sentinel = sentinel.window, current = state.windows, "Stale sentinel");
                return LoadOutcome::Stale;
            }

            let start = state.visible;
            let end = (start + self.settings.window_size).min(self.pages.len());
            let ahead = (end + self.settings.lookahead).min(self.pages.len());
            state.loading = true;

            // Recorded as requested only once the preloads complete, so a
            // dropped load leaves its pages to the next one
            let claim = |range: std::ops::Range<usize>| -> Vec<String> {
                self.pages[range]
                    .iter()
                    .filter(|url| !state.requested.contains(*url))
                    .cloned()
                    .collect()
            };
            let window = claim(start..end);
            let lookahead = claim(end..ahead);
            (start, end, window, lookahead)
        };
        let _guard = LoadingGuard { state: &self.state };

        let window_loads = join_all(window.iter().map(|url| self.preloader.preload(url)));
        let lookahead_loads = join_all(lookahead.iter().map(|url| self.preloader.preload(url)));
        let (loaded, _) = futures::join!(window_loads, lookahead_loads);
        let failed = loaded.iter().filter(|ok| !**ok).count();

        {
            let mut state = self.state.lock().unwrap();
            state.requested.extend(window.iter().chain(lookahead.iter()).cloned());
            state.visible = end;
            state.windows += 1;
        }
        debug!(start, end, failed, lookahead = lookahead.len(), "Loaded page window");
        LoadOutcome::Loaded { start, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingPreloader {
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Preloader for CountingPreloader {
        async fn preload(&self, url: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            true
        }
    }

    fn pages(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("/c/{:03}.jpg", i)).collect()
    }

    #[tokio::test]
    async fn test_windows_and_lookahead() {
        let preloader = Arc::new(CountingPreloader::default());
        let loader = IncrementalPageLoader::new(pages(23), preloader.clone(), LoaderSettings::default());

        assert_eq!(loader.load_initial().await, LoadOutcome::Loaded { start: 0, end: 10 });
        assert_eq!(loader.visible_count(), 10);
        // window plus lookahead
        assert_eq!(preloader.calls.load(Ordering::SeqCst), 15);

        let sentinel = loader.sentinel().unwrap();
        assert_eq!(loader.on_sentinel_visible(sentinel).await, LoadOutcome::Loaded { start: 10, end: 20 });
        // pages 11..15 were already warmed
        assert_eq!(preloader.calls.load(Ordering::SeqCst), 23);

        let sentinel = loader.sentinel().unwrap();
        assert_eq!(loader.on_sentinel_visible(sentinel).await, LoadOutcome::Loaded { start: 20, end: 23 });
        assert!(loader.sentinel().is_none());
        assert!(!loader.has_more());
        assert_eq!(loader.visible(), pages(23));
        assert_eq!(preloader.calls.load(Ordering::SeqCst), 23);
    }

    #[tokio::test]
    async fn test_repeated_sentinel_is_idempotent() {
        let preloader = Arc::new(CountingPreloader::default());
        let loader = IncrementalPageLoader::new(pages(30), preloader.clone(), LoaderSettings::default());
        loader.load_initial().await;

        let sentinel = loader.sentinel().unwrap();
        assert!(matches!(loader.on_sentinel_visible(sentinel).await, LoadOutcome::Loaded { .. }));
        assert_eq!(loader.on_sentinel_visible(sentinel).await, LoadOutcome::Stale);
        assert_eq!(loader.on_sentinel_visible(sentinel).await, LoadOutcome::Stale);
        assert_eq!(loader.visible_count(), 20);
        assert_eq!(loader.load_initial().await, LoadOutcome::Stale);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_load_once() {
        let preloader = Arc::new(CountingPreloader::default());
        let loader = IncrementalPageLoader::new(pages(30), preloader.clone(), LoaderSettings::default());
        loader.load_initial().await;

        let sentinel = loader.sentinel().unwrap();
        let (a, b) = tokio::join!(
            loader.on_sentinel_visible(sentinel),
            loader.on_sentinel_visible(sentinel)
        );
        let loaded = [a, b]
            .iter()
            .filter(|o| matches!(o, LoadOutcome::Loaded { .. }))
            .count();
        assert_eq!(loaded, 1);
        assert_eq!(loader.visible_count(), 20);
        assert!(!loader.is_loading());
    }

    #[derive(Default)]
    struct StallingPreloader {
        stall: AtomicBool,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl Preloader for StallingPreloader {
        async fn preload(&self, _url: &str) -> bool {
            if self.stall.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_load_leaves_pages_to_retry() {
        let preloader = Arc::new(StallingPreloader::default());
        preloader.stall.store(true, Ordering::SeqCst);
        let loader = IncrementalPageLoader::new(pages(30), preloader.clone(), LoaderSettings::default());

        let dropped = tokio::time::timeout(Duration::from_secs(1), loader.load_initial()).await;
        assert!(dropped.is_err());
        assert!(!loader.is_loading());
        assert_eq!(loader.visible_count(), 0);
        assert_eq!(loader.requested_count(), 0);

        preloader.stall.store(false, Ordering::SeqCst);
        assert_eq!(loader.load_initial().await, LoadOutcome::Loaded { start: 0, end: 10 });
        assert_eq!(loader.requested_count(), 15);
        assert_eq!(preloader.completed.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn test_empty_chapter() {
        let preloader = Arc::new(CountingPreloader::default());
        let loader = IncrementalPageLoader::new(Vec::new(), preloader, LoaderSettings::default());
        assert_eq!(loader.load_initial().await, LoadOutcome::Exhausted);
        assert!(loader.sentinel().is_none());
    }
}
