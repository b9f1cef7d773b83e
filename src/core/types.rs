//! # Core Types
//!
//! Request-side data structures shared by the normalizer, the key builder and the
//! proxy service. A [`NormalizedRequest`] is built once per inbound call and never
//! persisted directly; only the key derived from it reaches the cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::core::error::ProxyError;

/// Methods the proxy forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Convert into the method type used by the HTTP stack
    pub fn to_http(self) -> axum::http::Method {
        match self {
            HttpMethod::Get => axum::http::Method::GET,
            HttpMethod::Post => axum::http::Method::POST,
            HttpMethod::Put => axum::http::Method::PUT,
            HttpMethod::Delete => axum::http::Method::DELETE,
            HttpMethod::Patch => axum::http::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            _ => Err(ProxyError::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl TryFrom<&axum::http::Method> for HttpMethod {
    type Error = ProxyError;

    fn try_from(method: &axum::http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// Body encoding recognised from the inbound content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Xml,
    /// A content type was sent but is not one the proxy parses
    Other,
    None,
}

impl ContentKind {
    /// Classify a raw `Content-Type` header value, ignoring parameters
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return ContentKind::None;
        };

        let essence = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.is_empty() {
            return ContentKind::None;
        }

        match essence.as_str() {
            "application/json" => ContentKind::Json,
            "application/xml" | "text/xml" => ContentKind::Xml,
            other if other.ends_with("+json") => ContentKind::Json,
            _ => ContentKind::Other,
        }
    }
}

/// Transport-independent view of an inbound request
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Parsed body; always `Null` for GET and for unparsed content types
    pub body: Value,
    pub content_type: ContentKind,
}

impl NormalizedRequest {
    pub fn has_body(&self) -> bool {
        !self.body.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert!(matches!(
            "OPTIONS".parse::<HttpMethod>(),
            Err(ProxyError::UnsupportedMethod { .. })
        ));
    }

    #[test]
    fn test_content_kind_classification() {
        assert_eq!(
            ContentKind::from_header(Some("application/json; charset=utf-8")),
            ContentKind::Json
        );
        assert_eq!(
            ContentKind::from_header(Some("application/vnd.api+json")),
            ContentKind::Json
        );
        assert_eq!(ContentKind::from_header(Some("text/xml")), ContentKind::Xml);
        assert_eq!(
            ContentKind::from_header(Some("Application/XML")),
            ContentKind::Xml
        );
        assert_eq!(
            ContentKind::from_header(Some("text/plain")),
            ContentKind::Other
        );
        assert_eq!(ContentKind::from_header(None), ContentKind::None);
        assert_eq!(ContentKind::from_header(Some("  ")), ContentKind::None);
    }
}
