//! In-memory `ContentSource`

use super::ContentSource;
use crate::error::{ResolveError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct Tree {
    files: HashSet<String>,
    documents: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
}

/// A content tree held in memory
///
/// Files only exist; documents exist and can be fetched as JSON. Every call
/// is counted and logged so tests can check how many requests a resolution
/// took.
#[derive(Debug, Default)]
pub struct StaticSource {
    tree: Mutex<Tree>,
    probes: AtomicUsize,
    fetches: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, url: impl Into<String>) -> Self {
        self.add_file(url);
        self
    }

    pub fn with_json(self, url: impl Into<String>, document: Value) -> Self {
        self.add_json(url, document);
        self
    }

    pub fn add_file(&self, url: impl Into<String>) {
        self.tree.lock().unwrap().files.insert(url.into());
    }

    pub fn add_files<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tree = self.tree.lock().unwrap();
        tree.files.extend(urls.into_iter().map(Into::into));
    }

    pub fn add_json(&self, url: impl Into<String>, document: Value) {
        self.tree.lock().unwrap().documents.insert(url.into(), document);
    }

    pub fn remove(&self, url: &str) {
        let mut tree = self.tree.lock().unwrap();
        tree.files.remove(url);
        tree.documents.remove(url);
    }

    /// Makes every request to `url` wait `delay` before answering
    pub fn add_delay(&self, url: impl Into<String>, delay: Duration) {
        self.tree.lock().unwrap().delays.insert(url.into(), delay);
    }

    /// Number of existence checks served
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Number of documents or bytes served, including failed fetches
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> usize {
        self.probe_count() + self.fetch_count()
    }

    /// Every requested URL, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reset_counters(&self) {
        self.probes.store(0, Ordering::SeqCst);
        self.fetches.store(0, Ordering::SeqCst);
        self.requests.lock().unwrap().clear();
    }

    async fn record(&self, url: &str) {
        self.requests.lock().unwrap().push(url.to_string());
        let delay = self.tree.lock().unwrap().delays.get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn exists(&self, url: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.record(url).await;
        let tree = self.tree.lock().unwrap();
        tree.files.contains(url) || tree.documents.contains_key(url)
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.record(url).await;
        let tree = self.tree.lock().unwrap();
        match tree.documents.get(url) {
            Some(document) => Ok(document.clone()),
            None if tree.files.contains(url) => Err(ResolveError::InvalidManifest {
                url: url.to_string(),
                reason: "not a JSON document".to_string(),
            }),
            None => Err(ResolveError::NotFound(url.to_string())),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.record(url).await;
        let tree = self.tree.lock().unwrap();
        if let Some(document) = tree.documents.get(url) {
            return Ok(document.to_string().into_bytes());
        }
        if tree.files.contains(url) {
            return Ok(Vec::new());
        }
        Err(ResolveError::NotFound(url.to_string()))
    }
}
