//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MCP_FAVICON_*)
//! 2. TOML config file (if MCP_FAVICON_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Desktop browser identity; some hosts reject default client identifiers.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MCP_FAVICON_*)
/// 2. TOML config file (if MCP_FAVICON_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite file backing the disk tier of the response cache.
    ///
    /// Set via MCP_FAVICON_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via MCP_FAVICON_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request HTTP timeout in milliseconds.
    ///
    /// Set via MCP_FAVICON_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted per response.
    ///
    /// Set via MCP_FAVICON_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of resolution jobs in flight during a batch.
    ///
    /// Set via MCP_FAVICON_MAX_CONCURRENCY environment variable.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Memory tier capacity, weighted by body size.
    #[serde(default = "default_cache_bytes")]
    pub memory_cache_bytes: u64,

    /// Disk tier capacity; least recently accessed rows are evicted past it.
    #[serde(default = "default_cache_bytes")]
    pub disk_cache_bytes: u64,

    /// Base URL of the public favicon lookup service.
    ///
    /// Set via MCP_FAVICON_FALLBACK_SERVICE_URL environment variable.
    #[serde(default = "default_fallback_service_url")]
    pub fallback_service_url: String,

    /// Icon size requested from the lookup service (`sz` parameter).
    #[serde(default = "default_fallback_icon_size")]
    pub fallback_icon_size: u32,

    /// Upper bound on waiting for cancelled jobs during shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Delay inserted between batch admissions.
    #[serde(default = "default_batch_stagger_ms")]
    pub batch_stagger_ms: u64,

    /// Capacity of the icon-resolved broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./favicon-cache.sqlite")
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_concurrency() -> usize {
    3
}

fn default_cache_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_fallback_service_url() -> String {
    "https://www.google.com/s2/favicons".into()
}

fn default_fallback_icon_size() -> u32 {
    64
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_batch_stagger_ms() -> u64 {
    50
}

fn default_event_buffer() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_concurrency: default_max_concurrency(),
            memory_cache_bytes: default_cache_bytes(),
            disk_cache_bytes: default_cache_bytes(),
            fallback_service_url: default_fallback_service_url(),
            fallback_icon_size: default_fallback_icon_size(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            batch_stagger_ms: default_batch_stagger_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn batch_stagger(&self) -> Duration {
        Duration::from_millis(self.batch_stagger_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MCP_FAVICON_`
    /// 2. TOML file from `MCP_FAVICON_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MCP_FAVICON_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MCP_FAVICON_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
