//! Resolver settings stored in the MangaShelf configuration
//!
//! [`MangaConfigExt`] adds typed accessors for the `content`, `resolver`,
//! `cache` and `loader` sections to `mangaconfig::Config`.

use crate::loader::LoaderSettings;
use crate::settings::{ResolverSettings, DEFAULT_BASE_URL};
use anyhow::{anyhow, Result};
use mangaconfig::{impl_u64_config, impl_usize_config, Config};
use serde_yaml::Value;
use std::time::Duration;

/// Storage used by the resolution cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Sqlite,
    Memory,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(CacheBackendKind::Sqlite),
            "memory" => Ok(CacheBackendKind::Memory),
            other => Err(anyhow!("Unknown cache backend '{}'", other)),
        }
    }
}

/// Extension trait for MangaShelf resolver settings
///
/// # Example
///
/// ```rust,ignore
/// use mangaconfig::get_config;
/// use mangaresolver::MangaConfigExt;
///
/// let config = get_config();
/// let settings = config.resolver_settings()?;
/// println!("content root: {}", settings.base_url);
/// ```
pub trait MangaConfigExt {
    fn get_content_base_url(&self) -> Result<String>;
    fn set_content_base_url(&self, url: &str) -> Result<()>;

    /// Backend root, `None` when not configured
    fn get_api_url(&self) -> Result<Option<String>>;
    fn set_api_url(&self, url: &str) -> Result<()>;

    fn get_sidecar_index(&self) -> Result<String>;

    /// Collection ids probed when no listing is available
    fn get_candidates(&self) -> Result<Vec<String>>;
    fn set_candidates(&self, ids: &[String]) -> Result<()>;

    fn get_probe_timeout_ms(&self) -> Result<u64>;
    fn set_probe_timeout_ms(&self, value: u64) -> Result<()>;
    fn get_listing_timeout_ms(&self) -> Result<u64>;
    fn set_listing_timeout_ms(&self, value: u64) -> Result<()>;

    fn get_chapter_batch_size(&self) -> Result<usize>;
    fn set_chapter_batch_size(&self, value: usize) -> Result<()>;
    fn get_chapter_min_found(&self) -> Result<usize>;
    fn set_chapter_min_found(&self, value: usize) -> Result<()>;
    fn get_chapter_probe_limit(&self) -> Result<u64>;
    fn set_chapter_probe_limit(&self, value: u64) -> Result<()>;

    fn get_extent_cap(&self) -> Result<u64>;
    fn set_extent_cap(&self, value: u64) -> Result<()>;
    fn get_bucket_size(&self) -> Result<u64>;
    fn set_bucket_size(&self, value: u64) -> Result<()>;
    fn get_max_buckets(&self) -> Result<u64>;
    fn set_max_buckets(&self, value: u64) -> Result<()>;
    fn get_brute_force_max_index(&self) -> Result<u64>;
    fn set_brute_force_max_index(&self, value: u64) -> Result<()>;
    fn get_brute_force_concurrency(&self) -> Result<usize>;
    fn set_brute_force_concurrency(&self, value: usize) -> Result<()>;

    fn get_loader_window_size(&self) -> Result<usize>;
    fn set_loader_window_size(&self, value: usize) -> Result<()>;
    fn get_loader_lookahead(&self) -> Result<usize>;
    fn set_loader_lookahead(&self, value: usize) -> Result<()>;

    fn get_cache_backend(&self) -> Result<CacheBackendKind>;

    /// Collection ids whose cached records are always ignored
    fn get_cache_bypass(&self) -> Result<Vec<String>>;

    /// Every resolver tunable in one value
    fn resolver_settings(&self) -> Result<ResolverSettings>;
}

fn to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl MangaConfigExt for Config {
    fn get_content_base_url(&self) -> Result<String> {
        Ok(self.get_string_or(&["content", "base_url"], DEFAULT_BASE_URL))
    }

    fn set_content_base_url(&self, url: &str) -> Result<()> {
        self.set_value(&["content", "base_url"], Value::String(url.to_string()))
    }

    fn get_api_url(&self) -> Result<Option<String>> {
        let url = self.get_string_or(&["content", "api_url"], "");
        Ok((!url.trim().is_empty()).then_some(url))
    }

    fn set_api_url(&self, url: &str) -> Result<()> {
        self.set_value(&["content", "api_url"], Value::String(url.to_string()))
    }

    fn get_sidecar_index(&self) -> Result<String> {
        Ok(self.get_string_or(&["content", "sidecar_index"], "index.json"))
    }

    fn get_candidates(&self) -> Result<Vec<String>> {
        match self.get_string_list(&["content", "candidates"]) {
            Ok(ids) => Ok(ids),
            Err(_) => Ok(ResolverSettings::default().candidates),
        }
    }

    fn set_candidates(&self, ids: &[String]) -> Result<()> {
        self.set_string_list(&["content", "candidates"], ids)
    }

    impl_u64_config!(get_probe_timeout_ms, set_probe_timeout_ms, &["content", "probe_timeout_ms"], 3000);
    impl_u64_config!(get_listing_timeout_ms, set_listing_timeout_ms, &["content", "listing_timeout_ms"], 3000);

    impl_usize_config!(get_chapter_batch_size, set_chapter_batch_size, &["resolver", "chapter_batch_size"], 7);
    impl_usize_config!(get_chapter_min_found, set_chapter_min_found, &["resolver", "chapter_min_found"], 3);
    impl_u64_config!(get_chapter_probe_limit, set_chapter_probe_limit, &["resolver", "chapter_probe_limit"], 49);

    impl_u64_config!(get_extent_cap, set_extent_cap, &["resolver", "extent_cap"], 200);
    impl_u64_config!(get_bucket_size, set_bucket_size, &["resolver", "bucket_size"], 100);
    impl_u64_config!(get_max_buckets, set_max_buckets, &["resolver", "max_buckets"], 10);
    impl_u64_config!(get_brute_force_max_index, set_brute_force_max_index, &["resolver", "brute_force_max_index"], 10);
    impl_usize_config!(get_brute_force_concurrency, set_brute_force_concurrency, &["resolver", "brute_force_concurrency"], 16);

    impl_usize_config!(get_loader_window_size, set_loader_window_size, &["loader", "window_size"], 10);
    impl_usize_config!(get_loader_lookahead, set_loader_lookahead, &["loader", "lookahead"], 5);

    fn get_cache_backend(&self) -> Result<CacheBackendKind> {
        self.get_string_or(&["cache", "backend"], "sqlite").parse()
    }

    fn get_cache_bypass(&self) -> Result<Vec<String>> {
        match self.get_value(&["cache", "bypass"]) {
            Ok(_) => self.get_string_list(&["cache", "bypass"]),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn resolver_settings(&self) -> Result<ResolverSettings> {
        Ok(ResolverSettings {
            base_url: self.get_content_base_url()?,
            api_url: self.get_api_url()?,
            sidecar_index: self.get_sidecar_index()?,
            candidates: self.get_candidates()?,
            probe_timeout: Duration::from_millis(self.get_probe_timeout_ms()?),
            listing_timeout: Duration::from_millis(self.get_listing_timeout_ms()?),
            chapter_batch_size: self.get_chapter_batch_size()?,
            chapter_min_found: self.get_chapter_min_found()?,
            chapter_probe_limit: to_u32(self.get_chapter_probe_limit()?),
            extent_cap: to_u32(self.get_extent_cap()?),
            bucket_size: to_u32(self.get_bucket_size()?),
            max_buckets: to_u32(self.get_max_buckets()?),
            brute_force_max_index: to_u32(self.get_brute_force_max_index()?),
            brute_force_concurrency: self.get_brute_force_concurrency()?,
            loader: LoaderSettings {
                window_size: self.get_loader_window_size()?,
                lookahead: self.get_loader_lookahead()?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_from_config() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let settings = config.resolver_settings().unwrap();
        assert_eq!(settings.chapter_batch_size, 7);
        assert_eq!(settings.chapter_min_found, 3);
        assert_eq!(settings.extent_cap, 200);
        assert_eq!(settings.bucket_size, 100);
        assert_eq!(settings.loader, LoaderSettings::default());
        assert!(settings.api_url.is_none());
        assert_eq!(settings.candidates.len(), 8);
        assert_eq!(config.get_cache_backend().unwrap(), CacheBackendKind::Sqlite);
        assert!(config.get_cache_bypass().unwrap().is_empty());
    }

    #[test]
    fn test_settings_round_trip_through_config() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        config.set_api_url("http://localhost:5000/api").unwrap();
        config.set_extent_cap(500).unwrap();
        config.set_loader_window_size(4).unwrap();

        let settings = config.resolver_settings().unwrap();
        assert_eq!(settings.api_url.as_deref(), Some("http://localhost:5000/api"));
        assert_eq!(settings.extent_cap, 500);
        assert_eq!(settings.loader.window_size, 4);
    }

    #[test]
    fn test_unknown_cache_backend_is_an_error() {
        assert!("redis".parse::<CacheBackendKind>().is_err());
        assert_eq!("Memory".parse::<CacheBackendKind>().unwrap(), CacheBackendKind::Memory);
    }
}
