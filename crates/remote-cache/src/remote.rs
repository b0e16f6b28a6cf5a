//! Read-through cache over upstream JSON endpoints.
//!
//! Responses are keyed by their full request URL. A miss (or a forced
//! refresh) performs an HTTP GET, validates the body as JSON, stores it
//! with the configured TTL and returns it. Failed fetches are never
//! retried and never fall back to stale entries.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::pagination::{self, FetchedPages};
use crate::redis_store::RedisStore;
use crate::store::{CacheStore, MemoryStore};

/// Caching HTTP client for paged upstream APIs.
///
/// Cloning is cheap; clones share the store, HTTP connection pool and
/// runtime handle.
#[derive(Clone)]
pub struct RemoteCache {
    store: Arc<dyn CacheStore>,
    client: Client,
    config: Arc<CacheConfig>,
    handle: Handle,
}

impl RemoteCache {
    /// Create a cache over an explicit store.
    ///
    /// Group fetches are spawned on `handle`.
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig, handle: Handle) -> CacheResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.max_concurrent_fetches.max(1))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CacheError::Store(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            store,
            client,
            config: Arc::new(config),
            handle,
        })
    }

    /// Create a cache backed by an in-memory LRU store.
    pub fn in_memory(config: CacheConfig, handle: Handle) -> CacheResult<Self> {
        let store = Arc::new(MemoryStore::new(config.memory_capacity));
        Self::new(store, config, handle)
    }

    /// Create a cache backed by Redis when `redis_url` is configured,
    /// otherwise by an in-memory store.
    pub async fn connect(config: CacheConfig, handle: Handle) -> CacheResult<Self> {
        match config.redis_url.clone() {
            Some(url) => {
                let store = Arc::new(RedisStore::connect(&url).await?);
                Self::new(store, config, handle)
            }
            None => {
                info!("No Redis URL configured, using in-memory cache store");
                Self::in_memory(config, handle)
            }
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Runtime handle fetch tasks are spawned on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Read a cached response.
    pub async fn get(&self, key: &str) -> CacheResult<Value> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(CacheError::Miss(key.to_string())),
        }
    }

    /// Store a response, resetting its TTL.
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(key, Bytes::from(bytes), ttl).await
    }

    /// Return the cached response for `url`, fetching it on a miss or when
    /// `force_fetch` is set.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_or_fetch(&self, url: &str, force_fetch: bool) -> CacheResult<Value> {
        if !force_fetch {
            if let Some(value) = self.cached(url).await? {
                debug!("Cache hit");
                return Ok(value);
            }
        }
        self.fetch_and_store(url).await
    }

    /// Fetch a batch of URLs, serving cached entries from the store and
    /// fetching the rest concurrently.
    ///
    /// The result holds exactly one entry per distinct URL. Any failed
    /// fetch fails the whole batch.
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn get_or_fetch_group(
        &self,
        urls: &[String],
        force_fetch: bool,
    ) -> CacheResult<HashMap<String, Value>> {
        let mut seen = HashSet::new();
        let distinct: Vec<&String> = urls.iter().filter(|u| seen.insert(u.as_str())).collect();

        let mut results = HashMap::with_capacity(distinct.len());
        let mut uncached = Vec::new();

        for url in distinct {
            if !force_fetch {
                if let Some(value) = self.cached(url).await? {
                    results.insert(url.clone(), value);
                    continue;
                }
            }
            uncached.push(url.clone());
        }

        debug!(
            cached = results.len(),
            uncached = uncached.len(),
            "Partitioned group fetch"
        );

        let limit = self.config.max_concurrent_fetches.max(1);
        let mut fetches = stream::iter(uncached)
            .map(|url| {
                let this = self.clone();
                self.handle.spawn(async move {
                    let value = this.fetch_and_store(&url).await;
                    (url, value)
                })
            })
            .buffer_unordered(limit);

        while let Some(joined) = fetches.next().await {
            let (url, value) = joined?;
            results.insert(url, value?);
        }

        Ok(results)
    }

    /// Fetch every page of a paged endpoint, sizing pages from the
    /// endpoint family configured for `base_url`.
    pub async fn get_or_fetch_all_pages(
        &self,
        base_url: &str,
        force_fetch: bool,
    ) -> CacheResult<FetchedPages> {
        let per_page = self.config.items_per_page_for(base_url);
        self.get_or_fetch_all_pages_with(base_url, per_page, force_fetch)
            .await
    }

    /// Fetch every page of a paged endpoint with an explicit page size.
    ///
    /// The base URL is fetched once to read `meta.totalItems`. If the
    /// response is not paged, or declares no items, it is returned alone.
    #[instrument(skip(self), fields(url = %base_url))]
    pub async fn get_or_fetch_all_pages_with(
        &self,
        base_url: &str,
        items_per_page: usize,
        force_fetch: bool,
    ) -> CacheResult<FetchedPages> {
        let first = self.get_or_fetch(base_url, force_fetch).await?;

        let total = match pagination::total_items(&first) {
            Some(total) if total > 0 => total,
            _ => {
                let mut pages = FetchedPages::new();
                pages.push(base_url, first);
                return Ok(pages);
            }
        };

        let page_count = pagination::page_count(total, items_per_page);
        let urls: Vec<String> = (1..=page_count)
            .map(|page| pagination::page_url(base_url, page, items_per_page))
            .collect();

        info!(
            total_items = total,
            items_per_page,
            pages = page_count,
            "Fetching paged endpoint"
        );

        let mut fetched = self.get_or_fetch_group(&urls, force_fetch).await?;

        let mut pages = FetchedPages::new();
        for url in urls {
            let response = fetched
                .remove(&url)
                .ok_or_else(|| CacheError::Miss(url.clone()))?;
            pages.push(url, response);
        }
        Ok(pages)
    }

    /// Concatenate the `data` and `included` arrays of fetched pages.
    pub fn merge_pages(pages: &FetchedPages) -> Value {
        pagination::merge_pages(pages)
    }

    async fn cached(&self, url: &str) -> CacheResult<Option<Value>> {
        match self.store.get(url).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(url = %url, error = %e, "Discarding undecodable cache entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn fetch_and_store(&self, url: &str) -> CacheResult<Value> {
        let body = self.fetch(url).await?;

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| CacheError::upstream(url, format!("Response is not JSON: {}", e)))?;

        self.store.set(url, body, self.config.ttl()).await?;
        debug!(url = %url, "Stored upstream response");

        Ok(value)
    }

    async fn fetch(&self, url: &str) -> CacheResult<Bytes> {
        debug!(url = %url, "Fetching from upstream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::upstream(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Upstream returned error status");
            return Err(CacheError::upstream(url, format!("HTTP {}", status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| CacheError::upstream(url, e.to_string()))
    }
}
