//! # Proxy Module
//!
//! The request path from an inbound `/proxy/{partner}` call to a cached
//! response.
//!
//! - [`normalizer`] parses method, content type and body
//! - [`xml`] converts XML bodies to and from their JSON shape
//! - [`upstream`] dispatches to the partner
//! - [`service`] ties the registry, cache and upstream together

pub mod normalizer;
pub mod service;
pub mod upstream;
pub mod xml;

pub use service::{CacheStatus, CachedRequest, InboundRequest, ProxyOutcome, ProxyService};
pub use upstream::{ReqwestUpstream, Upstream, UpstreamBody, UpstreamFailure, UpstreamRequest, UpstreamResponse};
