//! Error types for cache and upstream operations.

use thiserror::Error;

/// Errors raised by [`RemoteCache`](crate::RemoteCache) and its stores.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No live entry exists for the key.
    #[error("Cache miss for key: {0}")]
    Miss(String),

    /// The upstream request failed, returned a non-2xx status or a body
    /// that is not JSON.
    #[error("Upstream fetch failed for {url}: {reason}")]
    UpstreamFetch { url: String, reason: String },

    /// The backing store rejected a read or write.
    #[error("Cache store error: {0}")]
    Store(String),

    /// A cached value could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A spawned fetch task panicked or was cancelled.
    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub(crate) fn upstream(url: &str, reason: impl Into<String>) -> Self {
        CacheError::UpstreamFetch {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Store(format!("Redis error: {}", e))
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        CacheError::Task(e.to_string())
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
