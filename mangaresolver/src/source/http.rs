//! `ContentSource` over HTTP

use super::ContentSource;
use crate::error::{ResolveError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace, warn};

const USER_AGENT: &str = concat!("mangashelf/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the static file server and the optional backend
///
/// Every request carries the configured timeout; a probe that times out
/// reads as absent.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn checked(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        debug!(url = %url, status = %status, "Response status");
        if !status.is_success() {
            return Err(ResolveError::from_status_code(status.as_u16(), url));
        }
        Ok(response)
    }

    async fn head(&self, url: &str) -> Result<StatusCode> {
        let response = self.client.head(url).send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn exists(&self, url: &str) -> bool {
        match self.head(url).await {
            Ok(status) if status.is_success() => true,
            // Some static servers refuse HEAD
            Ok(StatusCode::METHOD_NOT_ALLOWED) => match self.client.get(url).send().await {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    trace!(url = %url, error = %e, "Probe failed");
                    false
                }
            },
            Ok(status) => {
                trace!(url = %url, status = %status, "Probe miss");
                false
            }
            Err(e) => {
                trace!(url = %url, error = %e, "Probe failed");
                false
            }
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        let response = Self::checked(url, response)?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse response");
            ResolveError::JsonParse(e)
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let response = Self::checked(url, response)?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_source_probe_and_fetch() {
        let mut server = mockito::Server::new_async().await;
        let present = server
            .mock("HEAD", "/data/manga/naruto/info.json")
            .with_status(200)
            .create_async()
            .await;
        let manifest = server
            .mock("GET", "/data/manga/naruto/info.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"title": "Naruto"}"#)
            .create_async()
            .await;

        let source = HttpSource::new(Duration::from_secs(2)).unwrap();
        let url = format!("{}/data/manga/naruto/info.json", server.url());

        assert!(source.exists(&url).await);
        let value = source.fetch_json(&url).await.unwrap();
        assert_eq!(value["title"], "Naruto");

        present.assert_async().await;
        manifest.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_source_missing_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/data/manga/ghost/info.json")
            .with_status(404)
            .create_async()
            .await;
        let _missing_head = server
            .mock("HEAD", "/data/manga/ghost/info.json")
            .with_status(404)
            .create_async()
            .await;

        let source = HttpSource::new(Duration::from_secs(2)).unwrap();
        let url = format!("{}/data/manga/ghost/info.json", server.url());

        assert!(!source.exists(&url).await);
        let err = source.fetch_json(&url).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_http_source_head_refused() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/p/001.jpg")
            .with_status(405)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/p/001.jpg")
            .with_status(200)
            .with_body("jpeg")
            .create_async()
            .await;

        let source = HttpSource::new(Duration::from_secs(2)).unwrap();
        assert!(source.exists(&format!("{}/p/001.jpg", server.url())).await);
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_source_invalid_json() {
        let mut server = mockito::Server::new_async().await;
        let _bad = server
            .mock("GET", "/index.json")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let source = HttpSource::new(Duration::from_secs(2)).unwrap();
        let err = source
            .fetch_json(&format!("{}/index.json", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::JsonParse(_)));
    }
}
