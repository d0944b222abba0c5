//! Discovery of the available collection ids

use crate::paths::ContentPaths;
use crate::records::parse_id_list;
use crate::settings::ResolverSettings;
use crate::source::{fetch_json_within, ContentSource};
use futures::future::join_all;
use indexmap::IndexSet;
use mangacache::{CacheKey, CacheStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lists collections: backend, then sidecar index, then candidate probing
pub struct DirectoryResolver {
    source: Arc<dyn ContentSource>,
    cache: Arc<CacheStore>,
    paths: ContentPaths,
    candidates: Vec<String>,
    listing_timeout: Duration,
}

impl DirectoryResolver {
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: Arc<CacheStore>,
        settings: &ResolverSettings,
    ) -> Self {
        Self {
            source,
            cache,
            paths: settings.paths(),
            candidates: settings.candidates.clone(),
            listing_timeout: settings.listing_timeout,
        }
    }

    /// Returns the available collection ids, possibly empty
    ///
    /// A fresh cached listing short-circuits every tier. Only non-empty
    /// listings are cached, so an empty tree is rediscovered on the next call.
    pub async fn list_collections(&self) -> Vec<String> {
        let key = CacheKey::directory();
        if let Some(ids) = self.cache.get_json::<Vec<String>>(&key) {
            debug!(count = ids.len(), "Directory listing from cache");
            return ids;
        }

        let mut ids = self.from_backend().await;
        if ids.is_none() {
            ids = self.from_sidecar().await;
        }
        if ids.is_none() {
            ids = self.from_candidates().await;
        }

        let ids = ids.unwrap_or_default();
        if ids.is_empty() {
            warn!("No collection found");
        } else {
            info!(count = ids.len(), "Listed collections");
            self.cache.set_json(&key, &ids);
        }
        ids
    }

    async fn from_backend(&self) -> Option<Vec<String>> {
        let url = self.paths.api_directories()?;
        match fetch_json_within(self.source.as_ref(), &url, self.listing_timeout).await {
            Ok(payload) => {
                let ids = parse_id_list(&payload);
                if ids.is_none() {
                    warn!(url = %url, "Backend listing has an unexpected shape");
                }
                ids
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Backend listing unavailable");
                None
            }
        }
    }

    /// An empty sidecar is treated as absent
    async fn from_sidecar(&self) -> Option<Vec<String>> {
        let url = self.paths.sidecar_index();
        match fetch_json_within(self.source.as_ref(), &url, self.listing_timeout).await {
            Ok(payload) => parse_id_list(&payload).filter(|ids| !ids.is_empty()),
            Err(e) => {
                debug!(url = %url, error = %e, "No sidecar index");
                None
            }
        }
    }

    async fn from_candidates(&self) -> Option<Vec<String>> {
        let candidates: IndexSet<&str> = self.candidates.iter().map(String::as_str).collect();
        let checks = candidates.iter().map(|id| {
            let url = self.paths.manifest(id);
            async move { self.source.exists(&url).await.then(|| id.to_string()) }
        });
        let found: Vec<String> = join_all(checks).await.into_iter().flatten().collect();
        debug!(
            probed = candidates.len(),
            found = found.len(),
            "Probed candidate collections"
        );
        Some(found)
    }
}
