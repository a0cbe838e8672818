//! Redis-backed shared tier.
//!
//! Each entry is a hash holding the value and its expiration options, so
//! sliding expiration can be renewed on read without the caller knowing the
//! options it was written with.

use crate::cache::{CacheError, EntryOptions, SharedCache};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::{self, AsyncCommands, Pipeline};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use std::collections::HashMap;
use tracing::debug;

const FIELD_DATA: &str = "data";
const FIELD_SLIDING: &str = "sldexp";
const FIELD_ABSOLUTE: &str = "absexp";

#[derive(Clone)]
pub struct RedisSharedCache {
    pool: Pool,
}

impl RedisSharedCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a connection pool for `url`; no connection is made until first use
    pub fn connect(url: &str, max_size: usize) -> Result<Self, CacheError> {
        let mut config = Config::from_url(url);
        config.pool = Some(PoolConfig::new(max_size));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::SharedTierUnavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::SharedTierUnavailable(e.to_string()))
    }
}

fn unavailable(error: deadpool_redis::redis::RedisError) -> CacheError {
    CacheError::SharedTierUnavailable(error.to_string())
}

/// Seconds until expiry given the stored sliding window and absolute deadline
fn ttl_seconds(sliding_secs: Option<u64>, absolute_deadline: Option<i64>) -> Option<i64> {
    let now = Utc::now().timestamp();
    let absolute_left = absolute_deadline.map(|deadline| deadline - now);
    let sliding = sliding_secs.map(|secs| secs as i64);
    match (sliding, absolute_left) {
        (Some(sliding), Some(left)) => Some(sliding.min(left)),
        (Some(sliding), None) => Some(sliding),
        (None, left) => left,
    }
}

/// Replace the hash at `key` and set its expiry in one MULTI/EXEC block, so
/// no reader sees a missing entry or one without a TTL
fn set_pipeline(key: &str, value: String, options: EntryOptions) -> Pipeline {
    let sliding = options.sliding.map(|sliding| sliding.as_secs().max(1));
    let absolute = options
        .absolute
        .map(|absolute| Utc::now().timestamp() + absolute.as_secs().max(1) as i64);

    let mut fields = vec![(FIELD_DATA, value)];
    if let Some(sliding) = sliding {
        fields.push((FIELD_SLIDING, sliding.to_string()));
    }
    if let Some(absolute) = absolute {
        fields.push((FIELD_ABSOLUTE, absolute.to_string()));
    }

    let mut pipe = redis::pipe();
    pipe.atomic()
        .del(key)
        .ignore()
        .hset_multiple(key, &fields)
        .ignore();
    if let Some(ttl) = ttl_seconds(sliding, absolute) {
        pipe.expire(key, ttl.max(1)).ignore();
    }
    pipe
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(key).await.map_err(unavailable)?;
        let Some(value) = fields.get(FIELD_DATA).cloned() else {
            return Ok(None);
        };

        let sliding = fields
            .get(FIELD_SLIDING)
            .and_then(|raw| raw.parse::<u64>().ok());
        let absolute = fields
            .get(FIELD_ABSOLUTE)
            .and_then(|raw| raw.parse::<i64>().ok());

        if sliding.is_some() {
            match ttl_seconds(sliding, absolute) {
                Some(ttl) if ttl > 0 => {
                    let _: () = conn.expire(key, ttl).await.map_err(unavailable)?;
                }
                Some(_) => {
                    debug!(key = %key, "Shared entry passed its absolute deadline");
                    return Ok(None);
                }
                None => {}
            }
        }

        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: String, options: EntryOptions) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = set_pipeline(key, value, options)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await.map_err(unavailable)?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisSharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisSharedCache")
            .field("pool_size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_prefers_the_shorter_window() {
        let now = Utc::now().timestamp();
        assert_eq!(ttl_seconds(Some(3600), Some(now + 60)).map(|t| t <= 60), Some(true));
        assert_eq!(ttl_seconds(Some(30), Some(now + 600)), Some(30));
        assert_eq!(ttl_seconds(None, None), None);
    }

    #[test]
    fn test_set_is_a_single_transaction() {
        let options = EntryOptions::sliding(std::time::Duration::from_secs(60));
        let packed = set_pipeline("page", "body".to_string(), options).get_packed_pipeline();
        let packed = String::from_utf8_lossy(&packed);

        let order: Vec<usize> = ["MULTI", "DEL", "body", "EXPIRE", "EXEC"]
            .iter()
            .map(|command| packed.find(command).unwrap())
            .collect();
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]), "{packed}");
    }

    #[test]
    fn test_set_without_expiry_skips_expire() {
        let packed = set_pipeline("page", "body".to_string(), EntryOptions::default())
            .get_packed_pipeline();
        assert!(!String::from_utf8_lossy(&packed).contains("EXPIRE"));
    }

    #[tokio::test]
    async fn test_pool_creation_does_not_connect() {
        let cache = RedisSharedCache::connect("redis://127.0.0.1:1", 2);
        assert!(cache.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_unavailable() {
        let cache = RedisSharedCache::connect("redis://127.0.0.1:1", 1).unwrap();
        let result = cache.get("anything").await;
        assert!(matches!(result, Err(CacheError::SharedTierUnavailable(_))));
    }
}
