//! # HTTP Server Module
//!
//! Assembles the public router: the proxy route, the partner and cache admin
//! routers, health and Prometheus endpoints. Everything runs on one listener.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router as AxumRouter,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::caching::CacheAdminRouter;
use crate::core::config::ProxyConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::proxy::{InboundRequest, ProxyService};
use crate::registry::admin::RegistryAdminRouter;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<ProxyService>,
    /// Absent when no recorder was installed (tests, embedded use)
    pub metrics: Option<PrometheusHandle>,
}

/// The caching proxy HTTP server
pub struct ProxyServer {
    app: AxumRouter,
    bind_addr: SocketAddr,
}

impl ProxyServer {
    pub fn new(state: ServerState, config: &ProxyConfig) -> ProxyResult<Self> {
        let address = config.listen_address();
        let bind_addr: SocketAddr = address
            .parse()
            .map_err(|e| ProxyError::config(format!("Invalid bind address '{}': {}", address, e)))?;
        let app = build_router(state, config.server.max_body_size);
        Ok(Self { app, bind_addr })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start<F>(self, shutdown: F) -> ProxyResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            ProxyError::internal(format!("Failed to bind server to {}: {}", self.bind_addr, e))
        })?;

        info!(address = %self.bind_addr, "Caching proxy listening");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ProxyError::internal(format!("Server error: {}", e)))
    }
}

/// Build the full application router
pub fn build_router(state: ServerState, max_body_size: usize) -> AxumRouter {
    let proxy_routes = AxumRouter::new()
        .route("/proxy/:partner", any(proxy_request))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state.clone());

    AxumRouter::new()
        .merge(proxy_routes)
        .merge(RegistryAdminRouter::create_router(state.service.registry().clone()))
        .merge(CacheAdminRouter::create_router(state.service))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
}

/// `ANY /proxy/{partner}`
async fn proxy_request(
    State(state): State<ServerState>,
    Path(partner): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .service
        .handle(InboundRequest {
            partner: &partner,
            method: method.as_str(),
            query: uri.query(),
            content_type,
            body: &body,
        })
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, outcome.entry.kind.content_type()),
            (X_CACHE, outcome.status.as_str()),
        ],
        outcome.entry.payload,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    cache_backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// `GET /health`: healthy when the cache backend answers a ping
async fn health(State(state): State<ServerState>) -> Response {
    let backend = state.service.store().backend();

    match state.service.health().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy",
            cache_backend: backend,
            error: None,
            timestamp: chrono::Utc::now(),
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    cache_backend: backend,
                    error: Some(e.to_string()),
                    timestamp: chrono::Utc::now(),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /metrics` in Prometheus text format
async fn render_metrics(State(state): State<ServerState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheError, CacheResult, CacheStore, InMemoryCache};
    use crate::caching::stores::ScanPage;
    use crate::caching::CacheEntry;
    use crate::proxy::upstream::{Upstream, UpstreamFailure, UpstreamRequest, UpstreamResponse};
    use crate::registry::{PartnerRegistry, PartnerTarget};
    use async_trait::async_trait;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::collections::BTreeSet;

    struct Echo;

    #[async_trait]
    impl Upstream for Echo {
        async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure> {
            Ok(UpstreamResponse {
                status: 200,
                content_type: Some("application/json".into()),
                body: Bytes::from(json!({"url": request.url}).to_string()),
            })
        }
    }

    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        fn backend(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
            Err(CacheError::store("connection refused"))
        }
        async fn set(&self, _entry: &CacheEntry) -> CacheResult<()> {
            Err(CacheError::store("connection refused"))
        }
        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::store("connection refused"))
        }
        async fn scan(&self, _cursor: u64) -> CacheResult<ScanPage> {
            Err(CacheError::store("connection refused"))
        }
        async fn flush_all(&self) -> CacheResult<()> {
            Err(CacheError::store("connection refused"))
        }
        async fn ping(&self) -> CacheResult<()> {
            Err(CacheError::store("connection refused"))
        }
    }

    async fn server_with(store: Arc<dyn CacheStore>) -> TestServer {
        let registry = Arc::new(PartnerRegistry::in_memory());
        registry
            .add(
                "visa",
                PartnerTarget::Static("https://visa.test/pay".into()),
                BTreeSet::new(),
            )
            .await
            .unwrap();

        let service = Arc::new(ProxyService::new(registry, store, Arc::new(Echo), true));
        let state = ServerState {
            service,
            metrics: None,
        };
        TestServer::new(build_router(state, 1024)).unwrap()
    }

    #[tokio::test]
    async fn test_proxy_sets_cache_headers() {
        let server = server_with(Arc::new(InMemoryCache::new())).await;

        let first = server.get("/proxy/visa").add_query_param("id", "7").await;
        assert_eq!(first.status_code(), StatusCode::OK);
        assert_eq!(first.header("x-cache"), "MISS");
        assert_eq!(first.header("content-type"), "application/json");
        let body: Value = first.json();
        assert_eq!(body["url"], "https://visa.test/pay?id=7");

        let second = server.get("/proxy/visa").add_query_param("id", "7").await;
        assert_eq!(second.header("x-cache"), "HIT");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = server_with(Arc::new(InMemoryCache::new())).await;

        let response = server.get("/proxy/unknown").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

        let response = server
            .post("/proxy/visa")
            .content_type("application/json")
            .bytes(Bytes::from_static(b"{broken"))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server.method(Method::OPTIONS, "/proxy/visa").await;
        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = server_with(Arc::new(InMemoryCache::new())).await;
        let response = server
            .post("/proxy/visa")
            .content_type("application/json")
            .bytes(Bytes::from(vec![b' '; 4096]))
            .await;
        assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_store_outage_is_server_error() {
        let server = server_with(Arc::new(DownStore)).await;

        let response = server.get("/proxy/visa").await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_unknown_partner_is_404_even_when_store_is_down() {
        let server = server_with(Arc::new(DownStore)).await;

        let response = server.post("/proxy/ghost").json(&json!({"a": 1})).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"]["type"], "not_found");
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let server = server_with(Arc::new(InMemoryCache::new())).await;

        let body: Value = server.get("/health").await.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["cache_backend"], "memory");

        let response = server.get("/metrics").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }
}
