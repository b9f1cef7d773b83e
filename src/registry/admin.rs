//! # Partner Admin Interface
//!
//! Endpoints for listing, adding and deleting partners.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::{PartnerEntry, PartnerRegistry, PartnerTarget};
use crate::core::error::ProxyError;

/// Partner admin router
pub struct RegistryAdminRouter;

impl RegistryAdminRouter {
    pub fn create_router(registry: Arc<PartnerRegistry>) -> Router {
        Router::new()
            .route("/get-partners", get(list_partners))
            .route("/add-partner", post(add_partner))
            .route(
                "/delete-partner/:name",
                get(delete_partner).delete(delete_partner),
            )
            .with_state(registry)
    }
}

/// Body of `POST /add-partner`
#[derive(Debug, Deserialize)]
pub struct AddPartnerRequest {
    pub name: String,
    /// A URL string or `{"template": "..."}`
    pub url: PartnerTarget,
    #[serde(default)]
    pub ignore_fields: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
pub struct PartnerListResponse {
    pub partners: Vec<PartnerEntry>,
    pub total: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct PartnerChangeResponse {
    pub success: bool,
    pub message: String,
    pub partner: PartnerEntry,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub async fn list_partners(
    State(registry): State<Arc<PartnerRegistry>>,
) -> Json<PartnerListResponse> {
    let partners = registry.list().await;

    Json(PartnerListResponse {
        total: partners.len(),
        partners,
        timestamp: chrono::Utc::now(),
    })
}

pub async fn add_partner(
    State(registry): State<Arc<PartnerRegistry>>,
    payload: Result<Json<AddPartnerRequest>, JsonRejection>,
) -> Result<Json<PartnerChangeResponse>, ProxyError> {
    let Json(request) = payload.map_err(|e| ProxyError::malformed_body("json", e.body_text()))?;

    let partner = registry
        .add(&request.name, request.url, request.ignore_fields)
        .await?;

    info!(partner = %partner.name, "Partner registered via admin API");

    Ok(Json(PartnerChangeResponse {
        success: true,
        message: format!("Partner '{}' added", partner.name),
        partner,
        timestamp: chrono::Utc::now(),
    }))
}

pub async fn delete_partner(
    State(registry): State<Arc<PartnerRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<PartnerChangeResponse>, ProxyError> {
    let partner = registry.remove(&name).await?;

    info!(partner = %partner.name, "Partner deleted via admin API");

    Ok(Json(PartnerChangeResponse {
        success: true,
        message: format!("Partner '{}' deleted", partner.name),
        partner,
        timestamp: chrono::Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    fn server() -> TestServer {
        let registry = Arc::new(PartnerRegistry::in_memory());
        TestServer::new(RegistryAdminRouter::create_router(registry)).unwrap()
    }

    #[tokio::test]
    async fn test_partner_lifecycle() {
        let server = server();

        let response = server
            .post("/add-partner")
            .json(&json!({
                "name": "visa",
                "url": "https://visa.test/pay",
                "ignore_fields": ["salt"]
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let body: Value = server.get("/get-partners").await.json();
        assert_eq!(body["total"], 1);
        assert_eq!(body["partners"][0]["name"], "visa");
        assert_eq!(body["partners"][0]["url"], "https://visa.test/pay");

        let response = server.delete("/delete-partner/visa").await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let response = server.get("/delete-partner/visa").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_partner_is_bad_request() {
        let server = server();
        let partner = json!({"name": "mir", "url": {"template": "https://mir.test/{uuid}"}});

        server.post("/add-partner").json(&partner).await;
        let response = server.post("/add-partner").json(&partner).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let body: Value = response.json();
        assert_eq!(body["error"]["type"], "already_exists");
    }

    #[tokio::test]
    async fn test_malformed_add_request() {
        let server = server();
        let response = server
            .post("/add-partner")
            .json(&json!({"url": "https://x.test"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }
}
