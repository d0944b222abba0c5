//! Error types for the resolution cache

use thiserror::Error;

/// Result type for cache backend operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by storage backends
///
/// `CacheStore` never lets these reach the resolvers: a failed read is a miss
/// and a failed write is logged.
#[derive(Error, Debug)]
pub enum CacheError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while preparing the backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be turned back into an entry
    #[error("Invalid cache entry {key}: {reason}")]
    InvalidEntry { key: String, reason: String },
}
