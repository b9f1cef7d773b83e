//! # Caching Proxy
//!
//! A caching reverse proxy for named partners. Requests to `/proxy/{partner}`
//! are fingerprinted (method, URL, canonical body with per-partner ignored
//! fields nulled, partner name), looked up in Redis and forwarded to the
//! partner only on a miss. Every completed dispatch is memoized, failures
//! included, until it is explicitly invalidated.

/// Configuration, error types and shared request types
pub mod core;

/// Canonical keys, cache stores, miss coalescing and invalidation
pub mod caching;

/// Named partners, their targets and the persisted registry
pub mod registry;

/// Request normalization, upstream dispatch and orchestration
pub mod proxy;

/// HTTP server and routes
pub mod gateway;

/// Structured logging and Prometheus metrics
pub mod observability;

pub use crate::core::config::ProxyConfig;
pub use crate::core::error::{ProxyError, ProxyResult};
pub use crate::gateway::{ProxyServer, ServerState};
pub use crate::proxy::ProxyService;
pub use crate::registry::PartnerRegistry;
