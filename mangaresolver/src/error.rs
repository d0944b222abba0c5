//! Error types for content resolution
//!
//! These errors stay inside the resolvers: every tier turns them into "not
//! found" and moves on to the next fallback.

use std::time::Duration;
use thiserror::Error;

/// Result type for mangaresolver
pub type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The resource does not exist (404/410)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other non-2xx status
    #[error("Unexpected status {code} for {url}")]
    Status { code: u16, url: String },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body is not the JSON we expected
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Request exceeded its time budget
    #[error("Timed out after {elapsed:?}: {url}")]
    Timeout { elapsed: Duration, url: String },

    /// A manifest parsed but has an unusable shape
    #[error("Invalid manifest {url}: {reason}")]
    InvalidManifest { url: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Cache backend could not be opened
    #[error("Cache error: {0}")]
    Cache(#[from] mangacache::CacheError),
}

impl ResolveError {
    /// Maps an HTTP status code to an error
    pub fn from_status_code(code: u16, url: impl Into<String>) -> Self {
        match code {
            404 | 410 => Self::NotFound(url.into()),
            _ => Self::Status {
                code,
                url: url.into(),
            },
        }
    }

    /// True when the resource is known to be absent, as opposed to unreachable
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(ResolveError::from_status_code(404, "/a").is_not_found());
        assert!(ResolveError::from_status_code(410, "/a").is_not_found());
        assert!(matches!(
            ResolveError::from_status_code(503, "/a"),
            ResolveError::Status { code: 503, .. }
        ));
    }
}
