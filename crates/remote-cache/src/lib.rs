//! Caching and pagination layer for paged upstream REST APIs.
//!
//! Turns a paged JSON:API style upstream into a locally cached dataset:
//! - Read-through caching keyed by full request URL with a TTL
//! - Bounded concurrent group fetches
//! - Page discovery from `meta.totalItems` and page merging
//! - In-memory (LRU) and Redis stores

pub mod config;
pub mod error;
pub mod executor;
pub mod pagination;
pub mod redis_store;
pub mod remote;
pub mod store;

pub use config::{CacheConfig, EndpointConfig};
pub use error::{CacheError, CacheResult};
pub use executor::Executor;
pub use pagination::{merge_pages, FetchedPages};
pub use redis_store::RedisStore;
pub use remote::RemoteCache;
pub use store::{CacheStore, MemoryStore};
