//! # Cache Admin Interface
//!
//! Endpoints for browsing and invalidating cached responses.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{any, get},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::PayloadKind;
use crate::core::error::ProxyError;
use crate::proxy::{CachedRequest, ProxyService};

/// Cache admin router
pub struct CacheAdminRouter;

impl CacheAdminRouter {
    pub fn create_router(service: Arc<ProxyService>) -> Router {
        Router::new()
            .route("/cached-requests", get(list_cached_requests))
            .route("/reset-cache", any(reset_cache))
            .route(
                "/clear-cache/:partner",
                get(clear_partner_cache).delete(clear_partner_cache),
            )
            .route(
                "/cache-entry",
                get(get_cache_entry).delete(delete_cache_entry),
            )
            .with_state(service)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedRequestsResponse {
    pub entries: Vec<CachedRequest>,
    pub total: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheInvalidationResponse {
    pub success: bool,
    pub message: String,
    pub invalidated_count: Option<usize>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntryResponse {
    pub key: String,
    pub kind: PayloadKind,
    pub response: serde_json::Value,
}

/// Query parameters for the point endpoints
#[derive(Debug, Deserialize)]
pub struct CacheKeyQuery {
    pub key: String,
}

pub async fn list_cached_requests(
    State(service): State<Arc<ProxyService>>,
) -> Result<Json<CachedRequestsResponse>, ProxyError> {
    let entries = service.list_entries().await?;

    Ok(Json(CachedRequestsResponse {
        total: entries.len(),
        entries,
        timestamp: chrono::Utc::now(),
    }))
}

/// Flush every cached response
pub async fn reset_cache(
    State(service): State<Arc<ProxyService>>,
) -> Result<Json<CacheInvalidationResponse>, ProxyError> {
    service.reset_all().await?;
    info!("Cache reset via admin API");

    Ok(Json(CacheInvalidationResponse {
        success: true,
        message: "Cache cleared successfully".to_string(),
        invalidated_count: None,
        timestamp: chrono::Utc::now(),
    }))
}

/// Remove every entry cached for one partner
pub async fn clear_partner_cache(
    State(service): State<Arc<ProxyService>>,
    Path(partner): Path<String>,
) -> Result<Json<CacheInvalidationResponse>, ProxyError> {
    let removed = service.clear_partner(&partner).await?;
    info!(partner = %partner, removed, "Partner cache cleared via admin API");

    Ok(Json(CacheInvalidationResponse {
        success: true,
        message: format!("Cache for partner '{}' cleared", partner),
        invalidated_count: Some(removed),
        timestamp: chrono::Utc::now(),
    }))
}

pub async fn get_cache_entry(
    State(service): State<Arc<ProxyService>>,
    Query(query): Query<CacheKeyQuery>,
) -> Result<Json<CacheEntryResponse>, ProxyError> {
    let entry = service.get_by_key(&query.key).await?;
    let response = entry.decoded_payload()?;

    Ok(Json(CacheEntryResponse {
        key: entry.key,
        kind: entry.kind,
        response,
    }))
}

pub async fn delete_cache_entry(
    State(service): State<Arc<ProxyService>>,
    Query(query): Query<CacheKeyQuery>,
) -> Result<Json<CacheInvalidationResponse>, ProxyError> {
    service.delete_key(&query.key).await?;
    info!(key = %query.key, "Cache key deleted via admin API");

    Ok(Json(CacheInvalidationResponse {
        success: true,
        message: "Key deleted successfully".to_string(),
        invalidated_count: Some(1),
        timestamp: chrono::Utc::now(),
    }))
}
