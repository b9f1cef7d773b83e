//! # Registry Persistence
//!
//! The registry is persisted as one JSON object mapping partner names to
//! records. Every save rewrites the whole document; the file store writes a
//! sibling temp file and renames it over the target so readers never observe
//! a half-written registry.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::PartnerRecord;
use crate::core::error::{ProxyError, ProxyResult};

/// Persisted partner map, keyed by partner name
pub type PartnerRecords = BTreeMap<String, PartnerRecord>;

/// Storage backend for the partner registry
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Read the persisted map; a store that was never written yields an empty map
    async fn load(&self) -> ProxyResult<PartnerRecords>;

    /// Replace the persisted map
    async fn save(&self, records: &PartnerRecords) -> ProxyResult<()>;
}

/// JSON file registry store
#[derive(Debug, Clone)]
pub struct FileRegistryStore {
    path: PathBuf,
}

impl FileRegistryStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "partners.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for FileRegistryStore {
    async fn load(&self) -> ProxyResult<PartnerRecords> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Registry file not found, starting empty");
                return Ok(PartnerRecords::new());
            }
            Err(e) => {
                return Err(ProxyError::persistence(format!(
                    "Failed to read registry file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(PartnerRecords::new());
        }

        serde_json::from_slice(&content).map_err(|e| {
            ProxyError::persistence(format!(
                "Failed to parse registry file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save(&self, records: &PartnerRecords) -> ProxyResult<()> {
        let content = serde_json::to_vec_pretty(records)
            .map_err(|e| ProxyError::persistence(format!("Failed to serialize registry: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &content).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), partners = records.len(), "Registry persisted");
        Ok(())
    }
}

/// In-memory registry store for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    records: Mutex<PartnerRecords>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: PartnerRecords) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Copy of what was last saved
    pub async fn snapshot(&self) -> PartnerRecords {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn load(&self) -> ProxyResult<PartnerRecords> {
        Ok(self.records.lock().await.clone())
    }

    async fn save(&self, records: &PartnerRecords) -> ProxyResult<()> {
        *self.records.lock().await = records.clone();
        Ok(())
    }
}
