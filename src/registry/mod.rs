//! # Partner Registry
//!
//! Maps partner names to an upstream target and the body fields that are left
//! out of the cache fingerprint. The registry is built once at startup and
//! shared by every handler. Mutations are serialized through the write lock and
//! persisted before the lock is released; if persisting fails the in-memory
//! change is rolled back.
//!
//! Targets are either a static URL or a URL template. Templates are expanded on
//! every request and the expanded URL is never written back.

pub mod admin;
pub mod persistence;

pub use admin::RegistryAdminRouter;
pub use persistence::{FileRegistryStore, MemoryRegistryStore, PartnerRecords, RegistryStore};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::core::error::{ProxyError, ProxyResult};

/// URL template expanded freshly for every request.
///
/// Supported placeholders: `{uuid}` (random v4 UUID, fresh per occurrence) and
/// `{timestamp}` (unix milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTemplate {
    pub template: String,
}

impl UrlTemplate {
    pub fn new<S: Into<String>>(template: S) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn expand(&self) -> String {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let with_time = self.template.replace("{timestamp}", &timestamp);

        let mut parts = with_time.split("{uuid}");
        let mut expanded = parts.next().unwrap_or_default().to_string();
        for rest in parts {
            expanded.push_str(&Uuid::new_v4().to_string());
            expanded.push_str(rest);
        }
        expanded
    }
}

/// Where a partner's requests go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartnerTarget {
    Static(String),
    Generated(UrlTemplate),
}

impl PartnerTarget {
    /// Concrete URL for one request
    pub fn resolve(&self) -> String {
        match self {
            PartnerTarget::Static(url) => url.clone(),
            PartnerTarget::Generated(template) => template.expand(),
        }
    }
}

/// Persisted form of one partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub url: PartnerTarget,
    #[serde(default)]
    pub ignore_fields: BTreeSet<String>,
}

/// A registered partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerEntry {
    pub name: String,
    #[serde(rename = "url")]
    pub target: PartnerTarget,
    pub ignore_fields: BTreeSet<String>,
}

impl PartnerEntry {
    pub fn new<S: Into<String>>(name: S, target: PartnerTarget, ignore_fields: BTreeSet<String>) -> Self {
        Self {
            name: name.into(),
            target,
            ignore_fields,
        }
    }

    fn from_record(name: String, record: PartnerRecord) -> Self {
        Self {
            name,
            target: record.url,
            ignore_fields: record.ignore_fields,
        }
    }

    fn to_record(&self) -> PartnerRecord {
        PartnerRecord {
            url: self.target.clone(),
            ignore_fields: self.ignore_fields.clone(),
        }
    }

    /// Check the name and target before registration
    pub fn validate(&self) -> ProxyResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProxyError::invalid_partner("partner name cannot be empty"));
        }
        if self.name.contains('/') || self.name.chars().any(char::is_whitespace) {
            return Err(ProxyError::invalid_partner(format!(
                "partner name '{}' must not contain '/' or whitespace",
                self.name
            )));
        }

        // Templates are checked after expansion
        let candidate = self.target.resolve();
        let url = Url::parse(&candidate).map_err(|e| {
            ProxyError::invalid_partner(format!("target '{}' is not a valid URL: {}", candidate, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ProxyError::invalid_partner(format!(
                "target '{}' must be an absolute http(s) URL",
                candidate
            )));
        }

        if self.ignore_fields.iter().any(|f| f.is_empty()) {
            return Err(ProxyError::invalid_partner("ignore_fields cannot contain empty names"));
        }

        Ok(())
    }
}

/// Registry of partners, the only writer of the persisted form
pub struct PartnerRegistry {
    partners: RwLock<BTreeMap<String, PartnerEntry>>,
    store: Arc<dyn RegistryStore>,
}

impl PartnerRegistry {
    /// Load the registry from its persisted form
    pub async fn load(store: Arc<dyn RegistryStore>) -> ProxyResult<Self> {
        let records = store.load().await?;

        let mut partners = BTreeMap::new();
        for (name, record) in records {
            let entry = PartnerEntry::from_record(name.clone(), record);
            if let Err(e) = entry.validate() {
                warn!(partner = %name, error = %e, "Loaded partner fails validation");
            }
            partners.insert(name, entry);
        }

        info!(partners = partners.len(), "Partner registry loaded");

        Ok(Self {
            partners: RwLock::new(partners),
            store,
        })
    }

    /// Empty registry backed by an in-memory store
    pub fn in_memory() -> Self {
        Self {
            partners: RwLock::new(BTreeMap::new()),
            store: Arc::new(MemoryRegistryStore::new()),
        }
    }

    /// Look up a partner by name
    pub async fn resolve(&self, name: &str) -> ProxyResult<PartnerEntry> {
        self.partners
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ProxyError::not_found("partner", name))
    }

    /// Concrete URL for one request to `entry`
    pub fn resolve_target(&self, entry: &PartnerEntry) -> String {
        entry.target.resolve()
    }

    /// Sorted snapshot of every partner
    pub async fn list(&self) -> Vec<PartnerEntry> {
        self.partners.read().await.values().cloned().collect()
    }

    /// Register a new partner and persist the registry
    pub async fn add(
        &self,
        name: &str,
        target: PartnerTarget,
        ignore_fields: BTreeSet<String>,
    ) -> ProxyResult<PartnerEntry> {
        let entry = PartnerEntry::new(name, target, ignore_fields);
        entry.validate()?;

        let mut partners = self.partners.write().await;
        if partners.contains_key(name) {
            return Err(ProxyError::already_exists("partner", name));
        }

        partners.insert(name.to_string(), entry.clone());
        if let Err(e) = self.persist(&partners).await {
            partners.remove(name);
            return Err(e);
        }

        info!(partner = %name, "Partner added");
        Ok(entry)
    }

    /// Remove a partner and persist the registry
    pub async fn remove(&self, name: &str) -> ProxyResult<PartnerEntry> {
        let mut partners = self.partners.write().await;
        let entry = partners
            .remove(name)
            .ok_or_else(|| ProxyError::not_found("partner", name))?;

        if let Err(e) = self.persist(&partners).await {
            partners.insert(name.to_string(), entry);
            return Err(e);
        }

        info!(partner = %name, "Partner removed");
        Ok(entry)
    }

    async fn persist(&self, partners: &BTreeMap<String, PartnerEntry>) -> ProxyResult<()> {
        let records: PartnerRecords = partners
            .iter()
            .map(|(name, entry)| (name.clone(), entry.to_record()))
            .collect();

        self.store.save(&records).await.map_err(|e| {
            warn!(error = %e, "Failed to persist partner registry");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl RegistryStore for FailingStore {
        async fn load(&self) -> ProxyResult<PartnerRecords> {
            Ok(PartnerRecords::new())
        }

        async fn save(&self, _records: &PartnerRecords) -> ProxyResult<()> {
            Err(ProxyError::persistence("disk full"))
        }
    }

    fn fields(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_add_resolve_remove() {
        let store = Arc::new(MemoryRegistryStore::new());
        let registry = PartnerRegistry::load(store.clone()).await.unwrap();

        registry
            .add(
                "visa",
                PartnerTarget::Static("https://visa.test/pay".into()),
                fields(&["salt"]),
            )
            .await
            .unwrap();

        let entry = registry.resolve("visa").await.unwrap();
        assert_eq!(entry.ignore_fields, fields(&["salt"]));
        assert!(store.snapshot().await.contains_key("visa"));

        registry.remove("visa").await.unwrap();
        assert!(matches!(
            registry.resolve("visa").await,
            Err(ProxyError::NotFound { .. })
        ));
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let registry = PartnerRegistry::in_memory();
        let target = PartnerTarget::Static("https://a.test".into());

        registry.add("a", target.clone(), BTreeSet::new()).await.unwrap();
        assert!(matches!(
            registry.add("a", target, BTreeSet::new()).await,
            Err(ProxyError::AlreadyExists { .. })
        ));
        assert!(matches!(
            registry.remove("ghost").await,
            Err(ProxyError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_validation() {
        let registry = PartnerRegistry::in_memory();
        let ok = PartnerTarget::Static("https://a.test".into());

        for name in ["", "a/b", "has space"] {
            assert!(matches!(
                registry.add(name, ok.clone(), BTreeSet::new()).await,
                Err(ProxyError::InvalidPartner { .. })
            ));
        }

        for url in ["not a url", "ftp://files.test/x", "/relative/path"] {
            assert!(matches!(
                registry
                    .add("p", PartnerTarget::Static(url.into()), BTreeSet::new())
                    .await,
                Err(ProxyError::InvalidPartner { .. })
            ));
        }

        assert!(registry
            .add(
                "gen",
                PartnerTarget::Generated(UrlTemplate::new("https://g.test/{uuid}")),
                BTreeSet::new()
            )
            .await
            .is_ok());
        assert!(registry.list().await.len() == 1);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let registry = PartnerRegistry::load(Arc::new(FailingStore)).await.unwrap();

        let result = registry
            .add("visa", PartnerTarget::Static("https://visa.test".into()), BTreeSet::new())
            .await;
        assert!(matches!(result, Err(ProxyError::Persistence { .. })));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_persist_on_remove_keeps_partner() {
        let mut records = PartnerRecords::new();
        records.insert(
            "visa".into(),
            PartnerRecord {
                url: PartnerTarget::Static("https://visa.test".into()),
                ignore_fields: BTreeSet::new(),
            },
        );

        struct ReadOnlyStore(PartnerRecords);

        #[async_trait]
        impl RegistryStore for ReadOnlyStore {
            async fn load(&self) -> ProxyResult<PartnerRecords> {
                Ok(self.0.clone())
            }

            async fn save(&self, _records: &PartnerRecords) -> ProxyResult<()> {
                Err(ProxyError::persistence("read-only"))
            }
        }

        let registry = PartnerRegistry::load(Arc::new(ReadOnlyStore(records)))
            .await
            .unwrap();
        assert!(registry.remove("visa").await.is_err());
        assert!(registry.resolve("visa").await.is_ok());
    }

    #[test]
    fn test_template_expands_fresh_each_time() {
        let target = PartnerTarget::Generated(UrlTemplate::new("https://g.test/pay/{uuid}"));
        let a = target.resolve();
        let b = target.resolve();

        assert!(a.starts_with("https://g.test/pay/"));
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.trim_start_matches("https://g.test/pay/")).is_ok());
    }

    #[test]
    fn test_timestamp_placeholder() {
        let url = UrlTemplate::new("https://g.test/t/{timestamp}").expand();
        let millis: i64 = url.trim_start_matches("https://g.test/t/").parse().unwrap();
        assert!(millis > 1_600_000_000_000);
    }

    #[test]
    fn test_target_serialization_shape() {
        let static_target: PartnerTarget = serde_json::from_str(r#""https://a.test""#).unwrap();
        assert_eq!(static_target, PartnerTarget::Static("https://a.test".into()));

        let generated: PartnerTarget =
            serde_json::from_str(r#"{"template": "https://a.test/{uuid}"}"#).unwrap();
        assert_eq!(
            generated,
            PartnerTarget::Generated(UrlTemplate::new("https://a.test/{uuid}"))
        );
    }
}
