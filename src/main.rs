//! # Caching Proxy - Main Entry Point
//!
//! Startup sequence: configuration, logging, metrics recorder, cache store,
//! partner registry, upstream client, then the HTTP server with graceful
//! shutdown on SIGINT/SIGTERM.

use std::sync::Arc;
use tracing::{error, info, warn};

use caching_proxy::caching::stores::RedisCacheConfig;
use caching_proxy::caching::{CacheStore, InMemoryCache, RedisCache};
use caching_proxy::core::config::{CacheBackend, ConfigSource};
use caching_proxy::gateway::shutdown_signal;
use caching_proxy::observability::{init_logging, install_recorder};
use caching_proxy::proxy::ReqwestUpstream;
use caching_proxy::registry::persistence::FileRegistryStore;
use caching_proxy::{PartnerRegistry, ProxyConfig, ProxyResult, ProxyServer, ProxyService, ServerState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Caching proxy failed");
        eprintln!("caching-proxy: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ProxyResult<()> {
    let (config, source) = ProxyConfig::load().await?;
    init_logging(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting caching proxy");
    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults(path) => warn!(
            path = %path.display(),
            "Configuration file not found, using defaults and environment overrides"
        ),
    }

    let metrics = install_recorder()?;

    let store = build_store(&config).await?;
    info!(backend = store.backend(), "Cache store ready");

    let registry_store = Arc::new(FileRegistryStore::new(&config.registry.path));
    let registry = Arc::new(PartnerRegistry::load(registry_store).await?);

    let upstream = Arc::new(ReqwestUpstream::new(&config.upstream)?);

    let service = Arc::new(ProxyService::new(
        registry,
        store,
        upstream,
        config.cache.coalesce_misses,
    ));

    let server = ProxyServer::new(
        ServerState {
            service,
            metrics: Some(metrics),
        },
        &config,
    )?;

    server.start(shutdown_signal()).await?;

    info!("Caching proxy shutdown complete");
    Ok(())
}

async fn build_store(config: &ProxyConfig) -> ProxyResult<Arc<dyn CacheStore>> {
    match config.cache.backend {
        CacheBackend::Redis => {
            let store = RedisCache::new(RedisCacheConfig::from(&config.cache)).await?;
            Ok(Arc::new(store))
        }
        CacheBackend::Memory => {
            warn!("Using the in-memory cache backend; entries are lost on restart");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}
