//! # Proxy Service
//!
//! Orchestrates one proxied request:
//! resolve partner → normalize → build key → cache lookup → (miss) dispatch →
//! store → respond.
//!
//! Every completed dispatch is cached, including upstream failures, which are
//! stored as `{"status_code": u16 | null, "detail": string}` and replayed like
//! any other response. Store failures are never treated as misses; they abort
//! the request.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::normalizer::{append_query, normalize};
use super::upstream::{Upstream, UpstreamBody, UpstreamRequest, UpstreamResponse};
use super::xml::to_xml;
use crate::caching::{
    CacheEntry, CacheInvalidator, CacheKey, CacheStore, Flight, MissCoalescer, PayloadKind,
};
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{ContentKind, NormalizedRequest};
use crate::observability::metrics::{self, UpstreamOutcome};
use crate::registry::{PartnerEntry, PartnerRegistry, PartnerTarget};

/// Raw pieces of an inbound `/proxy/{partner}` request
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub partner: &'a str,
    pub method: &'a str,
    pub query: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

/// Whether a response came from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyOutcome {
    pub entry: CacheEntry,
    pub status: CacheStatus,
}

/// One row of the cache listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRequest {
    pub key: String,
    pub partner: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub kind: PayloadKind,
    pub response: Value,
}

/// The caching proxy
pub struct ProxyService {
    registry: Arc<PartnerRegistry>,
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    coalescer: MissCoalescer,
    invalidator: CacheInvalidator,
}

impl ProxyService {
    pub fn new(
        registry: Arc<PartnerRegistry>,
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn Upstream>,
        coalesce_misses: bool,
    ) -> Self {
        Self {
            invalidator: CacheInvalidator::new(store.clone()),
            registry,
            store,
            upstream,
            coalescer: MissCoalescer::new(coalesce_misses),
        }
    }

    pub fn registry(&self) -> &Arc<PartnerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Serve one proxied request from the cache or the partner
    pub async fn handle(&self, inbound: InboundRequest<'_>) -> ProxyResult<ProxyOutcome> {
        let partner = self.registry.resolve(inbound.partner).await?;

        let dispatch_url = append_query(self.registry.resolve_target(&partner), inbound.query);
        let request = normalize(
            inbound.method,
            dispatch_url,
            inbound.content_type,
            inbound.body,
        )?;

        let key = CacheKey::build(
            request.method,
            &key_url(&partner, inbound.query),
            &request.body,
            &partner.name,
            &partner.ignore_fields,
        );

        if let Some(entry) = self.store.get(key.as_str()).await? {
            metrics::record_cache_lookup(&partner.name, true);
            debug!(partner = %partner.name, method = %request.method, "Cache hit");
            return Ok(ProxyOutcome {
                entry,
                status: CacheStatus::Hit,
            });
        }
        metrics::record_cache_lookup(&partner.name, false);

        let entry = match self.coalescer.join(key.as_str()) {
            Flight::Leader(guard) => {
                let entry = self.dispatch_and_store(&partner, &request, &key).await?;
                guard.publish(entry.clone());
                entry
            }
            Flight::Follower(receiver) => {
                metrics::record_coalesced(&partner.name);
                match MissCoalescer::wait(receiver).await {
                    Some(entry) => entry,
                    None => {
                        debug!(partner = %partner.name, "In-flight dispatch abandoned, dispatching directly");
                        self.dispatch_and_store(&partner, &request, &key).await?
                    }
                }
            }
        };

        Ok(ProxyOutcome {
            entry,
            status: CacheStatus::Miss,
        })
    }

    async fn dispatch_and_store(
        &self,
        partner: &PartnerEntry,
        request: &NormalizedRequest,
        key: &CacheKey,
    ) -> ProxyResult<CacheEntry> {
        let upstream_request = UpstreamRequest {
            method: request.method,
            url: request.url.clone(),
            body: upstream_body(request)?,
        };

        let started = Instant::now();
        let result = self.upstream.send(upstream_request).await;
        let elapsed = started.elapsed();

        let entry = match result {
            Ok(response) if response.is_success() => {
                metrics::record_upstream(&partner.name, UpstreamOutcome::Success, elapsed);
                success_entry(key, request.content_type, &response)
            }
            Ok(response) => {
                metrics::record_upstream(&partner.name, UpstreamOutcome::HttpError, elapsed);
                warn!(
                    partner = %partner.name,
                    status = response.status,
                    "Upstream returned an error status, memoizing"
                );
                let detail = format!(
                    "Upstream responded with status {} for url '{}'",
                    response.status, request.url
                );
                failure_entry(key, Some(response.status), &detail)
            }
            Err(failure) => {
                metrics::record_upstream(&partner.name, UpstreamOutcome::TransportError, elapsed);
                warn!(partner = %partner.name, error = %failure, "Upstream dispatch failed, memoizing");
                failure_entry(key, None, &failure.to_string())
            }
        };

        self.store.set(&entry).await?;

        info!(
            partner = %partner.name,
            method = %request.method,
            kind = %entry.kind,
            elapsed_ms = elapsed.as_millis() as u64,
            "Cached upstream response"
        );

        Ok(entry)
    }

    /// Delete every cached entry
    pub async fn reset_all(&self) -> ProxyResult<()> {
        Ok(self.invalidator.reset_all().await?)
    }

    /// Delete every entry recorded for `partner`; returns how many were removed
    pub async fn clear_partner(&self, partner: &str) -> ProxyResult<usize> {
        Ok(self.invalidator.clear_partner(partner).await?)
    }

    /// Delete one entry by its exact key
    pub async fn delete_key(&self, key: &str) -> ProxyResult<()> {
        if self.invalidator.delete_key(key).await? {
            Ok(())
        } else {
            Err(ProxyError::not_found("cache key", key))
        }
    }

    /// Fetch one entry by its exact key
    pub async fn get_by_key(&self, key: &str) -> ProxyResult<CacheEntry> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| ProxyError::not_found("cache key", key))
    }

    /// Every cached entry with its decoded key fields and payload
    pub async fn list_entries(&self) -> ProxyResult<Vec<CachedRequest>> {
        let keys = self.store.list_keys().await?;
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            let entry = match self.store.get(&key).await {
                Ok(Some(entry)) => entry,
                // Removed between the scan and the read
                Ok(None) => continue,
                Err(crate::caching::CacheError::Corrupt { key, reason }) => {
                    warn!(key = %key, reason = %reason, "Skipping undecodable cache entry");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let response = match entry.decoded_payload() {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "Skipping cache entry with invalid payload");
                    continue;
                }
            };

            let fields = CacheKey::parse(&key).ok();
            entries.push(CachedRequest {
                partner: fields.as_ref().map(|f| f.partner.clone()),
                method: fields.as_ref().map(|f| f.method.clone()),
                url: fields.map(|f| f.url),
                kind: entry.kind,
                response,
                key,
            });
        }

        Ok(entries)
    }

    /// Round trip to the cache backend
    pub async fn health(&self) -> ProxyResult<()> {
        Ok(self.store.ping().await?)
    }
}

/// URL recorded in the cache key.
///
/// Generated targets contribute their template rather than the expanded URL, so
/// requests to them share entries even though each dispatch gets a fresh URL.
fn key_url(partner: &PartnerEntry, query: Option<&str>) -> String {
    let base = match &partner.target {
        PartnerTarget::Static(url) => url.clone(),
        PartnerTarget::Generated(template) => template.template.clone(),
    };
    append_query(base, query)
}

fn upstream_body(request: &NormalizedRequest) -> ProxyResult<UpstreamBody> {
    if request.body.is_null() {
        return Ok(UpstreamBody::None);
    }

    Ok(match request.content_type {
        ContentKind::Json => UpstreamBody::Json(request.body.clone()),
        ContentKind::Xml => UpstreamBody::Xml(to_xml(&request.body)?),
        ContentKind::Other | ContentKind::None => UpstreamBody::None,
    })
}

/// Pick the payload kind for a successful response
fn success_entry(key: &CacheKey, request_kind: ContentKind, response: &UpstreamResponse) -> CacheEntry {
    let parses_as_json = || serde_json::from_slice::<Value>(&response.body).is_ok();

    let kind = match request_kind {
        ContentKind::Json if parses_as_json() => PayloadKind::Json,
        ContentKind::Json | ContentKind::Xml => PayloadKind::Text,
        ContentKind::Other | ContentKind::None if response.is_json() && parses_as_json() => {
            PayloadKind::Json
        }
        ContentKind::Other | ContentKind::None => PayloadKind::Text,
    };

    CacheEntry::new(key.as_str(), response.body.clone(), kind)
}

fn failure_entry(key: &CacheKey, status: Option<u16>, detail: &str) -> CacheEntry {
    CacheEntry::json(
        key.as_str(),
        &json!({
            "status_code": status,
            "detail": detail,
        }),
    )
}
