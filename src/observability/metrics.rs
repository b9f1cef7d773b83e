//! # Metrics
//!
//! Prometheus export and the recording helpers used by the proxy service and the
//! invalidation paths. Recording goes through the `metrics` facade, so the
//! helpers are no-ops until [`install_recorder`] has run.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::core::error::{ProxyError, ProxyResult};

pub const CACHE_LOOKUPS: &str = "proxy_cache_lookups_total";
pub const UPSTREAM_REQUESTS: &str = "proxy_upstream_requests_total";
pub const UPSTREAM_DURATION: &str = "proxy_upstream_duration_seconds";
pub const CACHE_INVALIDATIONS: &str = "proxy_cache_invalidations_total";
pub const COALESCED_REQUESTS: &str = "proxy_coalesced_requests_total";

const UPSTREAM_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the global Prometheus recorder and return a handle for rendering
pub fn install_recorder() -> ProxyResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(UPSTREAM_DURATION.to_string()), UPSTREAM_BUCKETS)
        .map_err(|e| ProxyError::internal(format!("Failed to set histogram buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| ProxyError::internal(format!("Failed to install metrics recorder: {}", e)))
}

/// Outcome label for one upstream dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOutcome {
    Success,
    /// Non-2xx response
    HttpError,
    /// Connection failure or timeout
    TransportError,
}

impl UpstreamOutcome {
    fn label(&self) -> &'static str {
        match self {
            UpstreamOutcome::Success => "success",
            UpstreamOutcome::HttpError => "http_error",
            UpstreamOutcome::TransportError => "transport_error",
        }
    }
}

pub fn record_cache_lookup(partner: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(CACHE_LOOKUPS, "partner" => partner.to_string(), "result" => result).increment(1);
}

pub fn record_upstream(partner: &str, outcome: UpstreamOutcome, elapsed: Duration) {
    counter!(
        UPSTREAM_REQUESTS,
        "partner" => partner.to_string(),
        "outcome" => outcome.label()
    )
    .increment(1);
    histogram!(UPSTREAM_DURATION, "partner" => partner.to_string()).record(elapsed.as_secs_f64());
}

/// `scope` is one of `all`, `partner` or `key`
pub fn record_invalidation(scope: &'static str, removed: usize) {
    counter!(CACHE_INVALIDATIONS, "scope" => scope).increment(removed as u64);
}

pub fn record_coalesced(partner: &str) {
    counter!(COALESCED_REQUESTS, "partner" => partner.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(UpstreamOutcome::Success.label(), "success");
        assert_eq!(UpstreamOutcome::HttpError.label(), "http_error");
        assert_eq!(UpstreamOutcome::TransportError.label(), "transport_error");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_lookup("visa", true);
        record_upstream("visa", UpstreamOutcome::Success, Duration::from_millis(5));
        record_invalidation("all", 0);
    }
}
