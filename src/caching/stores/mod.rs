//! # Cache Stores Module
//!
//! Store adapters for cached partner responses. Values are written as
//! `<kind>\n<payload>` so the payload type survives the round trip through a
//! plain key-value backend.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryCache;
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::{CacheError, CacheResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Type tag stored alongside every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Json,
    Text,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Json => "json",
            PayloadKind::Text => "text",
        }
    }

    /// Content type used when the payload is served back to a client
    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadKind::Json => "application/json",
            PayloadKind::Text => "text/plain; charset=utf-8",
        }
    }

    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"json" => Some(PayloadKind::Json),
            b"text" => Some(PayloadKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    pub kind: PayloadKind,
}

impl CacheEntry {
    pub fn new<K: Into<String>, P: Into<Bytes>>(key: K, payload: P, kind: PayloadKind) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            kind,
        }
    }

    /// Entry holding a JSON document
    pub fn json<K: Into<String>>(key: K, value: &Value) -> Self {
        Self::new(key, value.to_string(), PayloadKind::Json)
    }

    /// Serialize into the stored value format
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.kind.as_str().as_bytes();
        let mut raw = Vec::with_capacity(tag.len() + 1 + self.payload.len());
        raw.extend_from_slice(tag);
        raw.push(b'\n');
        raw.extend_from_slice(&self.payload);
        raw
    }

    /// Parse a stored value; anything without a known tag line is corrupt
    pub fn decode<K: Into<String>>(key: K, raw: &[u8]) -> CacheResult<Self> {
        let key = key.into();
        let Some(split) = raw.iter().position(|b| *b == b'\n') else {
            return Err(CacheError::corrupt(key, "missing payload kind tag"));
        };

        let Some(kind) = PayloadKind::from_tag(&raw[..split]) else {
            let tag = String::from_utf8_lossy(&raw[..split]).into_owned();
            return Err(CacheError::corrupt(key, format!("unknown payload kind '{}'", tag)));
        };

        Ok(Self {
            key,
            payload: Bytes::copy_from_slice(&raw[split + 1..]),
            kind,
        })
    }

    /// Payload as a JSON value: json entries parse, text entries become a string
    pub fn decoded_payload(&self) -> CacheResult<Value> {
        match self.kind {
            PayloadKind::Json => serde_json::from_slice(&self.payload)
                .map_err(|e| CacheError::corrupt(self.key.clone(), format!("invalid json payload: {}", e))),
            PayloadKind::Text => Ok(Value::String(
                String::from_utf8_lossy(&self.payload).into_owned(),
            )),
        }
    }
}

/// One page of a key scan; a `next_cursor` of 0 means the scan is complete
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub next_cursor: u64,
    pub keys: Vec<String>,
}

/// Trait for cache store implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Fetch and decode the entry under `key`
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Write `entry`, replacing anything stored under its key
    async fn set(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Remove `key`; returns whether something was removed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Fetch one page of keys starting at `cursor` (0 starts a new scan)
    async fn scan(&self, cursor: u64) -> CacheResult<ScanPage>;

    /// Delete every entry in the store's namespace
    async fn flush_all(&self) -> CacheResult<()>;

    /// Round trip to the backend
    async fn ping(&self) -> CacheResult<()>;

    /// Collect every key by walking scan pages to completion
    async fn list_keys(&self) -> CacheResult<Vec<String>> {
        let mut cursor = 0;
        let mut keys = Vec::new();

        loop {
            let page = self.scan(cursor).await?;
            keys.extend(page.keys);

            if page.next_cursor == 0 {
                break;
            }
            cursor = page.next_cursor;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_encoding() {
        let entry = CacheEntry::json("k", &json!({"ok": true}));
        assert_eq!(entry.encode(), b"json\n{\"ok\":true}".to_vec());

        let decoded = CacheEntry::decode("k", &entry.encode()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.decoded_payload().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_text_payload_keeps_newlines() {
        let entry = CacheEntry::new("k", "<a>\n<b/>\n</a>", PayloadKind::Text);
        let decoded = CacheEntry::decode("k", &entry.encode()).unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"<a>\n<b/>\n</a>"));
        assert_eq!(
            decoded.decoded_payload().unwrap(),
            Value::String("<a>\n<b/>\n</a>".to_string())
        );
    }

    #[test]
    fn test_corrupt_values() {
        assert!(matches!(
            CacheEntry::decode("k", b"no tag line"),
            Err(CacheError::Corrupt { .. })
        ));
        assert!(matches!(
            CacheEntry::decode("k", b"yaml\nfoo: bar"),
            Err(CacheError::Corrupt { .. })
        ));

        let entry = CacheEntry::decode("k", b"json\n{broken").unwrap();
        assert!(matches!(
            entry.decoded_payload(),
            Err(CacheError::Corrupt { .. })
        ));
    }
}
