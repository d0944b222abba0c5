//! Collection metadata resolution

use crate::models::Collection;
use crate::paths::{ContentPaths, COVER_EXTENSIONS};
use crate::records::CollectionRecord;
use crate::settings::ResolverSettings;
use crate::source::{fetch_json_within, ContentSource};
use mangacache::{CacheKey, CacheStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves a collection record: backend, then `info.json`, then a bare
/// cover probe, then a record derived from the id
pub struct ManifestResolver {
    source: Arc<dyn ContentSource>,
    cache: Arc<CacheStore>,
    paths: ContentPaths,
    listing_timeout: Duration,
}

impl ManifestResolver {
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
        }
    }

    /// Always returns a record; missing fields carry their defaults
    ///
    /// Derived records are not cached, so a manifest published later is picked
    /// up on the next call.
    pub async fn resolve_collection(&self, id: &str) -> Collection {
        let key = CacheKey::manifest(id);
        if let Some(collection) = self.cache.get_json::<Collection>(&key) {
            debug!(collection = %id, "Manifest from cache");
            return collection;
        }

        let mut resolved = self.from_backend(id).await;
        if resolved.is_none() {
            resolved = self.from_manifest_file(id).await;
        }
        if resolved.is_none() {
            resolved = self.from_cover(id).await;
        }

        match resolved {
            Some(collection) => {
                info!(collection = %id, title = %collection.title, "Resolved collection");
                self.cache.set_json(&key, &collection);
                collection
            }
            None => {
                debug!(collection = %id, "No manifest, deriving record from id");
                Collection::derived(id)
            }
        }
    }

    fn parse(&self, id: &str, url: &str, payload: Value) -> Option<Collection> {
        // Backends may wrap the record
        let payload = match payload {
            Value::Object(mut map) if map.contains_key("story") => map.remove("story")?,
            other => other,
        };
        match serde_json::from_value::<CollectionRecord>(payload) {
            Ok(record) => {
                if let Some(declared) = record.declared_id() {
                    if declared != id {
                        debug!(collection = %id, declared = %declared, "Manifest declares another id");
                    }
                }
                Some(record.into_collection(id, &self.paths))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Unusable manifest");
                None
            }
        }
    }

    async fn from_backend(&self, id: &str) -> Option<Collection> {
        let url = self.paths.api_story(id)?;
        match fetch_json_within(self.source.as_ref(), &url, self.listing_timeout).await {
            Ok(payload) => self.parse(id, &url, payload),
            Err(e) => {
                debug!(url = %url, error = %e, "Backend story unavailable");
                None
            }
        }
    }

    async fn from_manifest_file(&self, id: &str) -> Option<Collection> {
        let url = self.paths.manifest(id);
        match self.source.fetch_json(&url).await {
            Ok(payload) => {
                let mut collection = self.parse(id, &url, payload)?;
                if collection.thumbnail_url.is_none() {
                    collection.thumbnail_url = self.find_cover(id).await;
                }
                Some(collection)
            }
            Err(e) => {
                debug!(url = %url, error = %e, "No manifest file");
                None
            }
        }
    }

    /// A cover without a manifest still yields a record
    async fn from_cover(&self, id: &str) -> Option<Collection> {
        let cover = self.find_cover(id).await?;
        Some(Collection {
            thumbnail_url: Some(cover),
            ..Collection::derived(id)
        })
    }

    async fn find_cover(&self, id: &str) -> Option<String> {
        for ext in COVER_EXTENSIONS {
            let url = self.paths.cover(id, ext);
            if self.source.exists(&url).await {
                return Some(url);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use serde_json::json;

    const BASE: &str = "http://h/data/manga";

    fn resolver(source: Arc<StaticSource>) -> ManifestResolver {
        ManifestResolver::new(
            source,
            Arc::new(CacheStore::in_memory()),
            &ResolverSettings::new(BASE),
        )
    }

    #[tokio::test]
    async fn test_manifest_file_with_defaults() {
        let source = Arc::new(
            StaticSource::new()
                .with_json(format!("{}/naruto/info.json", BASE), json!({"title": "Naruto"}))
                .with_file(format!("{}/naruto/cover.jpg", BASE)),
        );

        let collection = resolver(source).resolve_collection("naruto").await;
        assert_eq!(collection.title, "Naruto");
        assert_eq!(collection.author, "Unknown");
        assert_eq!(collection.status, "ongoing");
        assert_eq!(collection.rating, 5.0);
        assert_eq!(
            collection.thumbnail_url.as_deref(),
            Some("http://h/data/manga/naruto/cover.jpg")
        );
    }

    #[tokio::test]
    async fn test_complete_manifest_is_returned_as_written() {
        let source = Arc::new(StaticSource::new().with_json(
            format!("{}/monster/info.json", BASE),
            json!({
                "title": "Monster",
                "author": "Naoki Urasawa",
                "description": "A surgeon hunts a former patient.",
                "thumbnailUrl": "http://img.example/monster.jpg",
                "genres": ["Thriller", "Mystery"],
                "status": "Completed",
                "chapterCount": 162,
                "rating": 4.8,
                "views": 9001
            }),
        ));

        let collection = resolver(source).resolve_collection("monster").await;
        assert_eq!(
            collection,
            Collection {
                id: "monster".to_string(),
                title: "Monster".to_string(),
                author: "Naoki Urasawa".to_string(),
                description: Some("A surgeon hunts a former patient.".to_string()),
                thumbnail_url: Some("http://img.example/monster.jpg".to_string()),
                genres: vec!["Thriller".to_string(), "Mystery".to_string()],
                status: "Completed".to_string(),
                chapter_count: 162,
                rating: 4.8,
                views: 9001,
            }
        );
    }

    #[tokio::test]
    async fn test_cover_only() {
        let source = Arc::new(StaticSource::new().with_file(format!("{}/dragon_ball/cover.png", BASE)));
        let collection = resolver(source).resolve_collection("dragon_ball").await;
        assert_eq!(collection.title, "Dragon Ball");
        assert!(collection.thumbnail_url.unwrap().ends_with("cover.png"));
    }

    #[tokio::test]
    async fn test_derived_record_is_not_cached() {
        let source = Arc::new(StaticSource::new());
        let resolver = resolver(source.clone());

        let first = resolver.resolve_collection("ghost").await;
        assert_eq!(first, Collection::derived("ghost"));

        source.add_json(format!("{}/ghost/info.json", BASE), json!({"title": "Ghost Story"}));
        let second = resolver.resolve_collection("ghost").await;
        assert_eq!(second.title, "Ghost Story");
    }

    #[tokio::test]
    async fn test_resolved_record_is_cached() {
        let source = Arc::new(
            StaticSource::new()
                .with_json(format!("{}/conan/info.json", BASE), json!({"title": "Conan", "author": "Aoyama"})),
        );
        let resolver = resolver(source.clone());

        resolver.resolve_collection("conan").await;
        let requests = source.request_count();
        let again = resolver.resolve_collection("conan").await;
        assert_eq!(again.author, "Aoyama");
        assert_eq!(source.request_count(), requests);
    }
}
