//! # In-Memory Cache Store
//!
//! DashMap-backed store used for development and tests. Values are kept in the
//! same encoded form the Redis store writes, so decoding behaves identically.

use super::{CacheEntry, CacheStore, ScanPage};
use crate::caching::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

const SCAN_PAGE_SIZE: usize = 100;

/// In-memory cache implementation
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, Vec<u8>>>,
    page_size: usize,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_page_size(SCAN_PAGE_SIZE)
    }

    /// Create a store whose scans return at most `page_size` keys per page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Store a raw value without encoding it
    pub fn insert_raw<K: Into<String>>(&self, key: K, raw: Vec<u8>) {
        self.entries.insert(key.into(), raw);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        match self.entries.get(key) {
            Some(raw) => CacheEntry::decode(key, raw.value()).map(Some),
            None => Ok(None),
        }
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.entries.insert(entry.key.clone(), entry.encode());
        debug!(backend = "memory", kind = %entry.kind, "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    /// The cursor is an offset into the sorted key set, so a delete between
    /// pages can shift a key past the cursor. `list_keys` does not page.
    async fn scan(&self, cursor: u64) -> CacheResult<ScanPage> {
        let keys = self.sorted_keys();

        let start = (cursor as usize).min(keys.len());
        let end = (start + self.page_size).min(keys.len());
        let next_cursor = if end >= keys.len() { 0 } else { end as u64 };

        Ok(ScanPage {
            next_cursor,
            keys: keys[start..end].to_vec(),
        })
    }

    /// One sorted snapshot of the key set
    async fn list_keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.sorted_keys())
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheError, PayloadKind};

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = InMemoryCache::new();
        let entry = CacheEntry::new("test_key", "hello", PayloadKind::Text);

        cache.set(&entry).await.unwrap();
        assert_eq!(cache.get("test_key").await.unwrap(), Some(entry));

        assert!(cache.delete("test_key").await.unwrap());
        assert!(!cache.delete("test_key").await.unwrap());
        assert_eq!(cache.get("test_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_walks_every_page() {
        let cache = InMemoryCache::with_page_size(3);
        for i in 0..10 {
            cache
                .set(&CacheEntry::new(format!("key-{:02}", i), "v", PayloadKind::Text))
                .await
                .unwrap();
        }

        let first = cache.scan(0).await.unwrap();
        assert_eq!(first.keys.len(), 3);
        assert_eq!(first.next_cursor, 3);

        let mut cursor = first.next_cursor;
        let mut seen = first.keys;
        while cursor != 0 {
            let page = cache.scan(cursor).await.unwrap();
            seen.extend(page.keys);
            cursor = page.next_cursor;
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[9], "key-09");
    }

    #[tokio::test]
    async fn test_list_keys_is_one_sorted_snapshot() {
        let cache = InMemoryCache::with_page_size(1);
        for i in (0..500).rev() {
            cache.insert_raw(format!("key-{:04}", i), b"text\nv".to_vec());
        }

        let keys = cache.list_keys().await.unwrap();
        assert_eq!(keys.len(), 500);
        assert_eq!(keys[0], "key-0000");
        assert_eq!(keys[499], "key-0499");
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_flush_all() {
        let cache = InMemoryCache::new();
        cache
            .set(&CacheEntry::new("a", "1", PayloadKind::Text))
            .await
            .unwrap();
        cache.flush_all().await.unwrap();
        assert!(cache.is_empty());
        assert!(cache.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error_not_a_miss() {
        let cache = InMemoryCache::new();
        cache.insert_raw("bad", b"garbage".to_vec());
        assert!(matches!(
            cache.get("bad").await,
            Err(CacheError::Corrupt { .. })
        ));
    }
}
