//! # Configuration Module
//!
//! Loads the proxy configuration from a YAML file, layers environment variable
//! overrides on top and validates the result before the server starts.
//!
//! ## Key Features
//! - YAML parsing with serde, every section optional with sensible defaults
//! - Human readable durations (`"30s"`, `"500ms"`) via `humantime_serde`
//! - `PROXY_*` environment variable overrides
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::core::error::{ProxyError, ProxyResult};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "PROXY_CONFIG_PATH";

/// Configuration file used when `PROXY_CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/proxy.yaml";

/// Complete proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Cache backend settings
    pub cache: CacheConfig,

    /// Outbound HTTP client settings
    pub upstream: UpstreamConfig,

    /// Partner registry persistence
    pub registry: RegistryConfig,

    /// Log level and output format
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Resolve the config path from the environment and load it.
    ///
    /// A missing file is not an error: defaults are used (env overrides still
    /// apply) and a warning is logged once logging is up.
    pub async fn load() -> ProxyResult<(Self, ConfigSource)> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let config = Self::load_from_file(&path).await?;
            Ok((config, ConfigSource::File(path)))
        } else {
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok((config, ConfigSource::Defaults(path)))
        }
    }

    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| ProxyError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without env overrides or validation
    pub fn from_yaml(content: &str) -> ProxyResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProxyError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `PROXY_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> ProxyResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ProxyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PROXY_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ProxyError::config(format!("Invalid PROXY_SERVER_PORT: {}", e)))?;
        }

        if let Some(addr) = lookup("PROXY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(url) = lookup("PROXY_REDIS_URL") {
            self.cache.redis_url = url;
        }

        if let Some(path) = lookup("PROXY_REGISTRY_PATH") {
            self.registry.path = PathBuf::from(path);
        }

        if let Some(timeout) = lookup("PROXY_UPSTREAM_TIMEOUT") {
            self.upstream.timeout = humantime::parse_duration(&timeout)
                .map_err(|e| ProxyError::config(format!("Invalid PROXY_UPSTREAM_TIMEOUT: {}", e)))?;
        }

        if let Some(level) = lookup("PROXY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("PROXY_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(ProxyError::config(format!(
                        "Invalid PROXY_LOG_FORMAT: {} (expected json or text)",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Validate the configuration, collecting every problem found
    pub fn validate(&self) -> ProxyResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("server.bind_address cannot be empty".to_string());
        }

        if self.server.max_body_size == 0 {
            errors.push("server.max_body_size must be greater than 0".to_string());
        }

        if self.cache.backend == CacheBackend::Redis {
            match Url::parse(&self.cache.redis_url) {
                Ok(url) if matches!(url.scheme(), "redis" | "rediss" | "redis+unix" | "unix") => {}
                Ok(url) => errors.push(format!(
                    "cache.redis_url has unsupported scheme '{}'",
                    url.scheme()
                )),
                Err(e) => errors.push(format!("cache.redis_url is invalid: {}", e)),
            }
        }

        if self.cache.operation_timeout.is_zero() {
            errors.push("cache.operation_timeout must be greater than 0".to_string());
        }

        if self.cache.scan_batch_size == 0 {
            errors.push("cache.scan_batch_size must be greater than 0".to_string());
        }

        if self.upstream.timeout.is_zero() {
            errors.push("upstream.timeout must be greater than 0".to_string());
        }

        if self.upstream.connect_timeout.is_zero() {
            errors.push("upstream.connect_timeout must be greater than 0".to_string());
        }

        if self.registry.path.as_os_str().is_empty() {
            errors.push("registry.path cannot be empty".to_string());
        }

        if self.logging.level.trim().is_empty() {
            errors.push("logging.level cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::config(format!(
                "Configuration validation failed: {}",
                errors.join(", ")
            )))
        }
    }

    /// Socket address string the listener binds to
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file at this path did not exist
    Defaults(PathBuf),
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,

    /// Maximum accepted inbound body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Which cache backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Redis connection URL; the database index selects the namespace
    pub redis_url: String,

    /// Upper bound for any single store operation
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// COUNT hint passed to each SCAN page
    pub scan_batch_size: usize,

    /// Share one upstream dispatch between concurrent identical misses
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            operation_timeout: Duration::from_secs(2),
            scan_batch_size: 500,
            coalesce_misses: true,
        }
    }
}

/// Outbound client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Total time allowed for one upstream exchange
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
        }
    }
}

/// Partner registry persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// JSON file holding the partner map
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("partners.json"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}
