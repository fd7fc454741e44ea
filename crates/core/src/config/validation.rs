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
    /// - `memory_capacity` or `max_contexts` is 0
    /// - `fetch_attempts` is 0 or above 10
    /// - a timeout is below 100ms or above 5 minutes
    /// - the viewport is empty or larger than 10000px on a side
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_capacity == 0 {
            return Err(invalid("memory_capacity", "must be greater than 0"));
        }
        if self.disk_max_bytes == 0 {
            return Err(invalid("disk_max_bytes", "must be greater than 0"));
        }
        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "must be greater than 0"));
        }

        if self.fetch_attempts == 0 {
            return Err(invalid("fetch_attempts", "must be at least 1"));
        }
        if self.fetch_attempts > 10 {
            return Err(invalid("fetch_attempts", "must not exceed 10"));
        }

        for (field, value) in [
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("extraction_timeout_ms", self.extraction_timeout_ms),
        ] {
            if value < 100 {
                return Err(invalid(field, "must be at least 100ms"));
            }
            if value > 300_000 {
                return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
            }
        }

        if self.settle_ms > 10_000 {
            return Err(invalid("settle_ms", "must not exceed 10000ms"));
        }

        for (field, value) in [("viewport_width", self.viewport_width), ("viewport_height", self.viewport_height)] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
            if value > 10_000 {
                return Err(invalid(field, "must not exceed 10000px"));
            }
        }

        if self.max_contexts == 0 {
            return Err(invalid("max_contexts", "must be at least 1"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.max_contexts > 32 {
            tracing::warn!(
                max_contexts = self.max_contexts,
                "max_contexts above 32 can exhaust browser memory on small hosts"
            );
        }

        Ok(())
    }
}
