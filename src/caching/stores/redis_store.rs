//! # Redis Cache Store
//!
//! Redis-backed store built on a multiplexed `ConnectionManager`. Each operation
//! works on its own clone of the manager handle and runs under the configured
//! operation timeout; a timeout or connection failure is reported as an error,
//! never as a cache miss. The database index in the URL is the namespace that
//! `flush_all` empties.

use super::{CacheEntry, CacheStore, ScanPage};
use crate::caching::{CacheError, CacheResult};
use crate::core::config::CacheConfig;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Upper bound for each command, including connection setup
    pub operation_timeout: Duration,

    /// COUNT hint for SCAN pages
    pub scan_batch_size: usize,
}

impl From<&CacheConfig> for RedisCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            url: config.redis_url.clone(),
            operation_timeout: config.operation_timeout,
            scan_batch_size: config.scan_batch_size,
        }
    }
}

/// Redis cache implementation
#[derive(Clone)]
pub struct RedisCache {
    config: RedisCacheConfig,
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis and build the store
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())?;

        let connection = tokio::time::timeout(
            config.operation_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Timeout { operation: "CONNECT" })??;

        info!(url = %redact_url(&config.url), "Redis cache connected");

        Ok(Self { config, connection })
    }

    /// Run one command on a scoped connection handle under the operation timeout
    async fn run<T, F, Fut>(&self, operation: &'static str, command: F) -> CacheResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection.clone();

        match tokio::time::timeout(self.config.operation_timeout, command(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "Redis operation failed");
                Err(CacheError::Redis(e))
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.config.operation_timeout.as_millis() as u64,
                    "Redis operation timed out"
                );
                Err(CacheError::Timeout { operation })
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let raw: Option<Vec<u8>> = self
            .run("GET", |mut conn| async move { conn.get(key).await })
            .await?;

        match raw {
            Some(raw) => CacheEntry::decode(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        let raw = entry.encode();
        self.run("SET", |mut conn| async move {
            conn.set::<_, _, ()>(entry.key.as_str(), raw).await
        })
        .await?;

        debug!(backend = "redis", kind = %entry.kind, bytes = entry.payload.len(), "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed: i64 = self
            .run("DEL", |mut conn| async move { conn.del(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn scan(&self, cursor: u64) -> CacheResult<ScanPage> {
        let count = self.config.scan_batch_size;
        let (next_cursor, raw_keys): (u64, Vec<Vec<u8>>) = self
            .run("SCAN", |mut conn| async move {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("COUNT")
                    .arg(count)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(ScanPage {
            next_cursor,
            keys: utf8_keys(raw_keys),
        })
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.run("FLUSHDB", |mut conn| async move {
            redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await
        })
        .await?;

        info!("Flushed Redis cache database");
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let reply: String = self
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::store(format!("unexpected PING reply: {}", reply)))
        }
    }
}

/// Keep the keys this proxy could have written; binary keys are skipped
fn utf8_keys(raw: Vec<Vec<u8>>) -> Vec<String> {
    raw.into_iter()
        .filter_map(|key| match String::from_utf8(key) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(key = ?String::from_utf8_lossy(e.as_bytes()), "Skipping non-UTF-8 key in SCAN page");
                None
            }
        })
        .collect()
}

/// Hide the password component of a Redis URL for logging
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<invalid url>".to_string(),
    }
}
