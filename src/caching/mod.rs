//! # Caching System Module
//!
//! Request fingerprinting and the cache lifecycle for proxied partner traffic.
//! Entries never expire: they live until a full reset, a per-partner clear or an
//! explicit per-key delete removes them.
//!
//! ## Features
//! - Canonical, unhashed cache keys with per-partner ignore fields
//! - Redis and in-memory stores behind one async trait
//! - Typed payloads (`json` / `text`) stored with a one-line tag
//! - Single-flight coalescing of concurrent identical misses
//! - Maintenance operations and admin endpoints
//!
//! ## Architecture
//! 1. **Key Generator**: builds and parses [`CacheKey`] strings
//! 2. **Cache Stores**: Redis and in-memory implementations of [`CacheStore`]
//! 3. **Deduplication**: [`MissCoalescer`] shares one upstream dispatch per key
//! 4. **Invalidation**: reset, partner clear and key delete over any store
//! 5. **Admin Interface**: HTTP endpoints for browsing and invalidating entries

pub mod admin;
pub mod deduplication;
pub mod invalidation;
pub mod key_generator;
pub mod stores;

pub use admin::CacheAdminRouter;
pub use deduplication::{Flight, MissCoalescer};
pub use invalidation::CacheInvalidator;
pub use key_generator::{null_ignored_fields, CacheKey};
pub use stores::{CacheEntry, CacheStore, InMemoryCache, PayloadKind, RedisCache};

use crate::core::error::ProxyError;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache operation '{operation}' timed out")]
    Timeout { operation: &'static str },

    #[error("Corrupt cache entry under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl CacheError {
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn corrupt<K: Into<String>, S: Into<String>>(key: K, reason: S) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<CacheError> for ProxyError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Corrupt { key, reason } => ProxyError::CorruptEntry { key, reason },
            other => ProxyError::store_unavailable(other.to_string()),
        }
    }
}
