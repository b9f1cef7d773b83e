//! # Observability
//!
//! Structured logging setup and Prometheus metrics for the proxy.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::install_recorder;
