//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `max_concurrency` is 0 or above 64
    /// - either cache capacity is 0
    /// - `fallback_service_url` is not an http(s) URL
    /// - `shutdown_grace_ms` exceeds one minute
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.max_concurrency == 0 || self.max_concurrency > 64 {
            return Err(invalid("max_concurrency", "must be between 1 and 64"));
        }

        if self.memory_cache_bytes == 0 {
            return Err(invalid("memory_cache_bytes", "must be greater than 0"));
        }
        if self.disk_cache_bytes == 0 {
            return Err(invalid("disk_cache_bytes", "must be greater than 0"));
        }

        let service = self.fallback_service_url.trim();
        if !(service.starts_with("https://") || service.starts_with("http://")) {
            return Err(invalid("fallback_service_url", "must be an http(s) URL"));
        }

        if self.shutdown_grace_ms > 60_000 {
            return Err(invalid("shutdown_grace_ms", "must not exceed 60000ms"));
        }

        if self.batch_stagger_ms > self.timeout_ms {
            tracing::warn!(
                batch_stagger_ms = self.batch_stagger_ms,
                timeout_ms = self.timeout_ms,
                "batch_stagger_ms exceeds the request timeout; batches will be admission-bound"
            );
        }

        Ok(())
    }
}
