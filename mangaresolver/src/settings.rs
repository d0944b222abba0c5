//! Tunables shared by the resolvers

use crate::loader::LoaderSettings;
use crate::paths::ContentPaths;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/data/manga";

/// Collection ids probed when neither the backend nor a sidecar lists them
pub const DEFAULT_CANDIDATES: [&str; 8] = [
    "one-piece",
    "naruto",
    "doraemon",
    "dragon_ball",
    "conan",
    "cua_thu",
    "jujutsu_kaisen",
    "kimetsu_no_yaiba",
];

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Root of the static content tree
    pub base_url: String,
    /// Optional backend root
    pub api_url: Option<String>,
    /// File name of the directory sidecar under the content root
    pub sidecar_index: String,
    pub candidates: Vec<String>,
    pub probe_timeout: Duration,
    /// Bound on backend and sidecar requests
    pub listing_timeout: Duration,

    /// Chapter numbers probed concurrently per batch
    pub chapter_batch_size: usize,
    /// Chapter probing stops once this many chapters were found
    pub chapter_min_found: usize,
    /// Highest chapter number probed
    pub chapter_probe_limit: u32,

    /// Highest page number extent discovery will consider
    pub extent_cap: u32,
    pub bucket_size: u32,
    pub max_buckets: u32,
    /// Highest index tried by the brute-force fallback
    pub brute_force_max_index: u32,
    pub brute_force_concurrency: usize,

    pub loader: LoaderSettings,
}

impl ResolverSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn paths(&self) -> ContentPaths {
        ContentPaths::new(self.base_url.clone())
            .with_api(self.api_url.clone().unwrap_or_default())
            .with_sidecar(self.sidecar_index.clone())
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_url: None,
            sidecar_index: "index.json".to_string(),
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            probe_timeout: Duration::from_secs(3),
            listing_timeout: Duration::from_secs(3),
            chapter_batch_size: 7,
            chapter_min_found: 3,
            chapter_probe_limit: 49,
            extent_cap: 200,
            bucket_size: 100,
            max_buckets: 10,
            brute_force_max_index: 10,
            brute_force_concurrency: 16,
            loader: LoaderSettings::default(),
        }
    }
}
