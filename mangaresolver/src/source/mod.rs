//! Access to the content tree
//!
//! Resolvers never talk HTTP directly: they go through a [`ContentSource`],
//! which is either [`HttpSource`] in production or [`StaticSource`] in tests
//! and offline tools.

mod http;
mod memory;

pub use http::HttpSource;
pub use memory::StaticSource;

use crate::error::{ResolveError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Existence check; any failure counts as absent
    async fn exists(&self, url: &str) -> bool;

    /// Fetches and parses a JSON document
    async fn fetch_json(&self, url: &str) -> Result<Value>;

    /// Fetches raw bytes, used to warm page images
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`ContentSource::fetch_json`] bounded by `limit`
///
/// Dropping the returned future cancels the request.
pub async fn fetch_json_within(
    source: &dyn ContentSource,
    url: &str,
    limit: Duration,
) -> Result<Value> {
    match tokio::time::timeout(limit, source.fetch_json(url)).await {
        Ok(result) => result,
        Err(_) => Err(ResolveError::Timeout {
            elapsed: limit,
            url: url.to_string(),
        }),
    }
}
