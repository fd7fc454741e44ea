//! Two-tier stylesheet cache.
//!
//! Fetched stylesheets are stored under a key derived from their source URL
//! in two tiers:
//!
//! - a bounded in-memory tier evicting in insertion order
//! - a durable on-disk tier (one JSON file per key) bounded by age and total size
//!
//! Stores are write-through: a fill lands in both tiers. Lookups report which
//! tier answered so callers never have to guess provenance.

pub mod disk;
pub mod hash;
pub mod memory;
pub mod tiered;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use disk::{DiskTier, DiskUsage, GcReport};
pub use hash::{is_valid_key, stylesheet_key};
pub use memory::MemoryTier;
pub use tiered::StylesheetCache;

/// Eviction limits shared by both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Maximum number of entries in the memory tier.
    pub memory_capacity: usize,
    /// Total size budget for the disk tier.
    pub disk_max_bytes: u64,
    /// Entries older than this are never served.
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { memory_capacity: 100, disk_max_bytes: 100 * 1024 * 1024, ttl: Duration::from_secs(24 * 60 * 60) }
    }
}

/// A cached stylesheet. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub content: String,
    pub origin_url: String,
    pub stored_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, origin_url: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            key: key.into(),
            size_bytes: content.len() as u64,
            content,
            origin_url: origin_url.into(),
            stored_at: Utc::now(),
        }
    }

    /// Whether the entry is older than `ttl` at `now`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        is_older_than(self.stored_at, ttl, now)
    }
}

pub(crate) fn is_older_than(stored_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(stored_at) > ttl,
        Err(_) => false,
    }
}

/// Which tier (if any) satisfied a stylesheet lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    MemoryHit,
    DiskHit,
    MissDownloaded,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::MemoryHit => "memory-hit",
            Provenance::DiskHit => "disk-hit",
            Provenance::MissDownloaded => "miss-downloaded",
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, Provenance::MissDownloaded)
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateTarget {
    Key(String),
    All,
}

impl InvalidateTarget {
    /// Parse the control-surface form: `"*"` clears everything.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "*" => InvalidateTarget::All,
            key => InvalidateTarget::Key(key.to_string()),
        }
    }
}

/// Entries removed per tier by an invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InvalidationReport {
    pub memory_removed: u64,
    pub disk_removed: u64,
}

/// Running counters and current occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub downloads: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub memory_entries: u64,
    pub memory_size_bytes: u64,
    pub disk_entries: u64,
    pub disk_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_size_matches_content() {
        let entry = CacheEntry::new("k", "https://a.test/x.css", "body{margin:0}");
        assert_eq!(entry.size_bytes, 14);
    }

    #[test]
    fn test_entry_expiry() {
        let mut entry = CacheEntry::new("k", "https://a.test/x.css", "a{}");
        let now = Utc::now();
        assert!(!entry.is_expired(Duration::from_secs(60), now));

        entry.stored_at = now - chrono::Duration::hours(25);
        assert!(entry.is_expired(Duration::from_secs(24 * 60 * 60), now));
    }

    #[test]
    fn test_provenance_serialization() {
        assert_eq!(serde_json::to_string(&Provenance::MemoryHit).unwrap(), "\"memory-hit\"");
        assert_eq!(serde_json::to_string(&Provenance::DiskHit).unwrap(), "\"disk-hit\"");
        assert_eq!(serde_json::to_string(&Provenance::MissDownloaded).unwrap(), "\"miss-downloaded\"");
        assert!(!Provenance::MissDownloaded.is_hit());
    }

    #[test]
    fn test_invalidate_target_parse() {
        assert_eq!(InvalidateTarget::parse("*"), InvalidateTarget::All);
        assert_eq!(InvalidateTarget::parse(" abc "), InvalidateTarget::Key("abc".into()));
    }
}
