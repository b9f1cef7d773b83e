//! # Cache Invalidation
//!
//! The three invalidation scopes: everything, every entry of one partner, and a
//! single key. Partner clears walk the store page by page and decode each key;
//! keys that do not decode (written by something else sharing the database) are
//! left alone.

use std::sync::Arc;
use tracing::{debug, info};

use super::key_generator::CacheKey;
use super::stores::CacheStore;
use super::CacheResult;
use crate::observability::metrics::record_invalidation;

/// Invalidation operations over a shared store
#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Delete every entry in the store's namespace
    pub async fn reset_all(&self) -> CacheResult<()> {
        self.store.flush_all().await?;
        record_invalidation("all", 1);
        info!(backend = self.store.backend(), "Cache reset");
        Ok(())
    }

    /// Delete every entry recorded for `partner`; returns how many were removed.
    ///
    /// Matching keys are collected from a complete key listing before anything
    /// is deleted, so a backend whose cursor shifts on removal still sees every key.
    pub async fn clear_partner(&self, partner: &str) -> CacheResult<usize> {
        let mut matching = Vec::new();
        let mut skipped = 0;

        for key in self.store.list_keys().await? {
            match CacheKey::parse(&key) {
                Ok(fields) if fields.partner == partner => matching.push(key),
                Ok(_) => {}
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, "Skipped keys that are not proxy cache keys");
        }

        let mut removed = 0;
        for key in &matching {
            if self.store.delete(key).await? {
                removed += 1;
            }
        }

        record_invalidation("partner", removed);
        info!(partner, removed, "Cleared partner cache entries");
        Ok(removed)
    }

    /// Delete one key; returns whether it existed
    pub async fn delete_key(&self, key: &str) -> CacheResult<bool> {
        let removed = self.store.delete(key).await?;
        if removed {
            record_invalidation("key", 1);
        }
        Ok(removed)
    }
}
