//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CRITCSS_*)
//! 2. TOML config file (if CRITCSS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CachePolicy;

mod validation;

pub use validation::ConfigError;

/// Browser-like identity used for direct stylesheet downloads.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/126.0.0.0 Safari/537.36";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CRITCSS_*)
/// 2. TOML config file (if CRITCSS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite result store.
    ///
    /// Set via CRITCSS_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding the on-disk stylesheet tier.
    ///
    /// Set via CRITCSS_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Maximum number of stylesheets kept in memory.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Size budget of the on-disk tier in bytes.
    #[serde(default = "default_disk_max_bytes")]
    pub disk_max_bytes: u64,

    /// Age after which cached stylesheets are no longer served.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Interval between background disk GC passes (0 disables the task).
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    /// User-Agent string for direct stylesheet downloads.
    ///
    /// Set via CRITCSS_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt stylesheet download timeout in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Number of direct download attempts before giving up.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    /// Base of the linear retry backoff in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Default viewport width used for extraction.
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    /// Default viewport height used for extraction.
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Default bound for a whole extraction in milliseconds.
    #[serde(default = "default_extraction_timeout_ms")]
    pub extraction_timeout_ms: u64,

    /// Layout settle wait after injecting the stylesheet.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Maximum number of browsing contexts alive at once.
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,

    /// Explicit Chrome/Chromium binary; auto-detected when unset.
    ///
    /// Set via CRITCSS_CHROME_EXECUTABLE environment variable.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Launch the browser with `--no-sandbox` (containers).
    #[serde(default)]
    pub no_sandbox: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./critcss.sqlite")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.critcss-cache")
}

fn default_memory_capacity() -> usize {
    100
}

fn default_disk_max_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_gc_interval_secs() -> u64 {
    60 * 60
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_fetch_timeout_ms() -> u64 {
    15_000
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_viewport_width() -> u32 {
    1200
}

fn default_viewport_height() -> u32 {
    800
}

fn default_extraction_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    1_000
}

fn default_max_contexts() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            memory_capacity: default_memory_capacity(),
            disk_max_bytes: default_disk_max_bytes(),
            cache_ttl_secs: default_cache_ttl_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            user_agent: default_user_agent(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            fetch_attempts: default_fetch_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            extraction_timeout_ms: default_extraction_timeout_ms(),
            settle_ms: default_settle_ms(),
            max_contexts: default_max_contexts(),
            chrome_executable: None,
            no_sandbox: false,
        }
    }
}

impl AppConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Background GC interval, `None` when disabled.
    pub fn gc_interval(&self) -> Option<Duration> {
        (self.gc_interval_secs > 0).then(|| Duration::from_secs(self.gc_interval_secs))
    }

    /// Eviction policy for the stylesheet cache.
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            memory_capacity: self.memory_capacity,
            disk_max_bytes: self.disk_max_bytes,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CRITCSS_`
    /// 2. TOML file from `CRITCSS_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("CRITCSS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CRITCSS_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
