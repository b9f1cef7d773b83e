//! # Gateway Module
//!
//! HTTP surface of the caching proxy.

pub mod server;

pub use server::{build_router, shutdown_signal, ProxyServer, ServerState};
