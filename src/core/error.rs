//! # Error Handling
//!
//! Error taxonomy for the caching proxy built on `thiserror`. Every variant maps to an
//! HTTP status code and renders as a structured JSON body, so handlers can simply
//! return `ProxyResult<T>` and let axum convert failures into responses.
//!
//! ## Propagation rules
//! - `NotFound` / `AlreadyExists` / `InvalidPartner` surface as client errors
//! - `MalformedBody` is a client error and is never written to the cache
//! - upstream failures are memoized by the proxy service and are not errors here
//! - `StoreUnavailable` is fatal for the current request and surfaces as a 500
//! - anything unexpected becomes `Internal` and is logged before it is returned

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the proxy
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Error types for the caching proxy
#[derive(Debug, Error, Clone)]
pub enum ProxyError {
    /// Unknown partner, unknown cache key
    #[error("{resource} not found: {name}")]
    NotFound { resource: String, name: String },

    /// Duplicate partner registration
    #[error("{resource} already exists: {name}")]
    AlreadyExists { resource: String, name: String },

    /// Body could not be parsed as the content type it claims to be
    #[error("Malformed {format} body: {reason}")]
    MalformedBody { format: String, reason: String },

    /// Partner definition rejected on add
    #[error("Invalid partner definition: {reason}")]
    InvalidPartner { reason: String },

    /// Method outside GET/POST/PUT/DELETE/PATCH
    #[error("Unsupported method: {method}")]
    UnsupportedMethod { method: String },

    /// Cache backend connection failure or timeout
    #[error("Cache store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Stored value that cannot be decoded into a cache entry
    #[error("Corrupt cache entry under key {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Partner registry could not be read or written
    #[error("Registry persistence error: {message}")]
    Persistence { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    /// Create a not found error for the given resource kind
    pub fn not_found<R: Into<String>, N: Into<String>>(resource: R, name: N) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Create an already exists error for the given resource kind
    pub fn already_exists<R: Into<String>, N: Into<String>>(resource: R, name: N) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Create a malformed body error
    pub fn malformed_body<F: Into<String>, S: Into<String>>(format: F, reason: S) -> Self {
        Self::MalformedBody {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_partner<S: Into<String>>(reason: S) -> Self {
        Self::InvalidPartner {
            reason: reason.into(),
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code returned to clients for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. } => StatusCode::BAD_REQUEST,
            Self::MalformedBody { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidPartner { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedMethod { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::StoreUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CorruptEntry { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::MalformedBody { .. } => "malformed_body",
            Self::InvalidPartner { .. } => "invalid_partner",
            Self::UnsupportedMethod { .. } => "unsupported_method",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::CorruptEntry { .. } => "corrupt_entry",
            Self::Configuration { .. } => "configuration_error",
            Self::Persistence { .. } => "persistence_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Server-side failures are logged when rendered; client errors are not
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

/// Converts errors into HTTP responses with a structured JSON body
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_server_error() {
            tracing::error!(error = %self, error_type = self.error_type(), "Request failed");
        }

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ProxyError::not_found("partner", "ghost").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::already_exists("partner", "visa").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::malformed_body("json", "eof").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::store_unavailable("connection refused").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::UnsupportedMethod { method: "HEAD".into() }.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_every_variant_is_client_error_or_500() {
        let errors = vec![
            ProxyError::not_found("partner", "ghost"),
            ProxyError::already_exists("partner", "visa"),
            ProxyError::malformed_body("xml", "unclosed tag"),
            ProxyError::invalid_partner("bad url"),
            ProxyError::UnsupportedMethod { method: "TRACE".into() },
            ProxyError::store_unavailable("timeout"),
            ProxyError::CorruptEntry {
                key: "k".into(),
                reason: "missing tag".into(),
            },
            ProxyError::config("bad port"),
            ProxyError::persistence("disk full"),
            ProxyError::internal("boom"),
        ];

        for err in errors {
            let status = err.status_code();
            assert!(
                status.is_client_error() || status == StatusCode::INTERNAL_SERVER_ERROR,
                "{} mapped to {}",
                err.error_type(),
                status
            );
        }
    }

    #[test]
    fn test_error_messages() {
        let err = ProxyError::not_found("partner", "ghost");
        assert_eq!(err.to_string(), "partner not found: ghost");
        assert_eq!(err.error_type(), "not_found");
        assert!(!err.is_server_error());
        assert!(ProxyError::internal("boom").is_server_error());
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let response = ProxyError::not_found("cache key", "k").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], 404);
        assert_eq!(body["error"]["type"], "not_found");
    }
}
