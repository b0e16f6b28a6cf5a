//! Configuration for the remote cache.
//!
//! Loaded from a YAML file or from environment variables. Any field left
//! unset takes its default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default entry lifetime: 72 hours.
pub const DEFAULT_TTL_SECS: u64 = 259_200;

/// Cache, HTTP client and pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of cached responses in seconds.
    pub ttl_secs: u64,

    /// Upper bound on concurrent upstream requests within one group fetch.
    pub max_concurrent_fetches: usize,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Worker threads for the executor runtime (tokio default when unset).
    pub worker_threads: Option<usize>,

    /// Redis URL; the in-memory store is used when unset.
    pub redis_url: Option<String>,

    /// Maximum number of entries held by the in-memory store.
    pub memory_capacity: usize,

    /// Page size for URLs not covered by an endpoint family.
    pub default_items_per_page: usize,

    /// Per-endpoint-family page size limits.
    pub endpoints: Vec<EndpointConfig>,
}

/// Page size limit for a family of upstream URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Human-readable name (e.g. "rise-location").
    pub name: String,

    /// URLs starting with this prefix belong to the family.
    pub url_prefix: String,

    /// Largest `itemsPerPage` the upstream accepts.
    pub max_items_per_page: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            max_concurrent_fetches: 8,
            request_timeout_secs: 60,
            worker_threads: None,
            redis_url: None,
            memory_capacity: 10_000,
            default_items_per_page: 100,
            endpoints: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {:?}", path))?;

        let config: CacheConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse cache config: {:?}", path))?;

        tracing::info!(
            endpoints = config.endpoints.len(),
            ttl_secs = config.ttl_secs,
            "Loaded cache config from {:?}",
            path
        );

        Ok(config)
    }

    /// Build configuration from environment variables.
    ///
    /// Reads a `.env` file first if one is present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();

        Self {
            ttl_secs: parse(&lookup, "REMOTE_CACHE_TTL_SECS").unwrap_or(defaults.ttl_secs),
            max_concurrent_fetches: parse(&lookup, "REMOTE_CACHE_MAX_CONCURRENT_FETCHES")
                .unwrap_or(defaults.max_concurrent_fetches),
            request_timeout_secs: parse(&lookup, "REMOTE_CACHE_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            worker_threads: parse(&lookup, "REMOTE_CACHE_WORKER_THREADS"),
            redis_url: lookup("REDIS_URL").filter(|v| !v.is_empty()),
            memory_capacity: parse(&lookup, "REMOTE_CACHE_MEMORY_CAPACITY")
                .unwrap_or(defaults.memory_capacity),
            default_items_per_page: parse(&lookup, "REMOTE_CACHE_ITEMS_PER_PAGE")
                .unwrap_or(defaults.default_items_per_page),
            endpoints: defaults.endpoints,
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Page size for a URL: the longest matching endpoint prefix wins,
    /// falling back to `default_items_per_page`.
    pub fn items_per_page_for(&self, url: &str) -> usize {
        self.endpoints
            .iter()
            .filter(|e| url.starts_with(&e.url_prefix))
            .max_by_key(|e| e.url_prefix.len())
            .map_or(self.default_items_per_page, |e| e.max_items_per_page)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(72 * 3600));
        assert!(config.redis_url.is_none());
        assert_eq!(config.items_per_page_for("http://anything"), 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
ttl_secs: 600
max_concurrent_fetches: 4
endpoints:
  - name: rise
    url_prefix: https://data.usbr.gov/rise/api/
    max_items_per_page: 100
  - name: rise-result
    url_prefix: https://data.usbr.gov/rise/api/result
    max_items_per_page: 10000
"#
        )
        .unwrap();

        let config = CacheConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.ttl_secs, 600);
        assert_eq!(config.max_concurrent_fetches, 4);
        // Unset fields keep defaults.
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.endpoints.len(), 2);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = CacheConfig::load_from_file("/nonexistent/cache.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let config = CacheConfig {
            endpoints: vec![
                EndpointConfig {
                    name: "rise".to_string(),
                    url_prefix: "https://data.usbr.gov/rise/api/".to_string(),
                    max_items_per_page: 100,
                },
                EndpointConfig {
                    name: "rise-result".to_string(),
                    url_prefix: "https://data.usbr.gov/rise/api/result".to_string(),
                    max_items_per_page: 10_000,
                },
            ],
            default_items_per_page: 25,
            ..Default::default()
        };

        assert_eq!(
            config.items_per_page_for("https://data.usbr.gov/rise/api/result?itemId=1"),
            10_000
        );
        assert_eq!(
            config.items_per_page_for("https://data.usbr.gov/rise/api/location"),
            100
        );
        assert_eq!(config.items_per_page_for("https://other.example/api"), 25);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("REMOTE_CACHE_TTL_SECS", "120"),
            ("REMOTE_CACHE_WORKER_THREADS", "2"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("REMOTE_CACHE_ITEMS_PER_PAGE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = CacheConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.ttl_secs, 120);
        assert_eq!(config.worker_threads, Some(2));
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.default_items_per_page, 100);
    }
}
