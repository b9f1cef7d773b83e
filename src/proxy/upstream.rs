//! # Upstream Transport
//!
//! The proxy service talks to partners through the [`Upstream`] trait so tests
//! can substitute a scripted transport. Any completed exchange is `Ok`, whatever
//! its status; only failures that produced no response (connect errors,
//! timeouts) are `Err`.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::fmt;

use crate::core::config::UpstreamConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::HttpMethod;

/// Body sent to the partner
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    None,
    Json(Value),
    /// Serialized XML document
    Xml(String),
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the partner labelled its response as JSON
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
                essence == "application/json" || essence.ends_with("+json")
            })
            .unwrap_or(false)
    }
}

/// A dispatch that produced no response
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("Upstream request to {url} timed out")]
    Timeout { url: String },

    #[error("Upstream request to {url} failed: {detail}")]
    Transport { url: String, detail: String },
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure>;
}

/// reqwest-backed transport with a shared connection pool
#[derive(Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestUpstream").finish_non_exhaustive()
    }
}

impl ReqwestUpstream {
    pub fn new(config: &UpstreamConfig) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| ProxyError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure> {
        let url = request.url;
        let mut builder = self.client.request(reqwest_method(request.method), &url);

        builder = match request.body {
            UpstreamBody::None => builder,
            UpstreamBody::Json(value) => builder.json(&value),
            UpstreamBody::Xml(document) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(document),
        };

        let failure = |e: reqwest::Error, url: &str| {
            if e.is_timeout() {
                UpstreamFailure::Timeout {
                    url: url.to_string(),
                }
            } else {
                UpstreamFailure::Transport {
                    url: url.to_string(),
                    detail: e.to_string(),
                }
            }
        };

        let response = builder.send().await.map_err(|e| failure(e, &url))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| failure(e, &url))?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
