//! Redis-backed store shared across processes.

use async_trait::async_trait;
use bytes::Bytes;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;

const KEY_PREFIX: &str = "remote-cache:";

/// Redis store client.
///
/// Entries are written with `SET EX`, so expiry is enforced by Redis.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Store(format!("Redis connection failed: {}", e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Store(format!("Redis connection failed: {}", e)))?;

        info!(url = %redis_url, "Connected to Redis cache store");

        Ok(Self { conn })
    }

    fn key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let result: Option<Vec<u8>> = conn.get(Self::key(key)).await?;
        Ok(result.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        // SET EX rejects a zero expiry.
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(Self::key(key), value.as_ref(), secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix() {
        assert_eq!(
            RedisStore::key("https://data.usbr.gov/rise/api/location"),
            "remote-cache:https://data.usbr.gov/rise/api/location"
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisStore::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(CacheError::Store(_))));
    }
}
