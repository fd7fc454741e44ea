//! Write-through combination of the memory and disk tiers.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::{
    CacheEntry, CachePolicy, CacheStats, DiskTier, GcReport, InvalidateTarget, InvalidationReport, MemoryTier,
    Provenance, is_valid_key,
};
use crate::Error;

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    downloads: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.memory_hits.store(0, Ordering::Relaxed);
        self.disk_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.downloads.store(0, Ordering::Relaxed);
    }
}

/// Two-tier stylesheet cache.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct StylesheetCache {
    memory: MemoryTier,
    disk: DiskTier,
    policy: CachePolicy,
    counters: Counters,
}

impl StylesheetCache {
    /// Open the cache rooted at `dir` and run an initial disk GC pass.
    pub async fn open(dir: impl AsRef<Path>, policy: CachePolicy) -> Result<Self, Error> {
        let disk = DiskTier::open(dir).await?;
        let cache = Self { memory: MemoryTier::new(policy.memory_capacity), disk, policy, counters: Counters::default() };

        match cache.disk.gc(&cache.policy).await {
            Ok(report) => tracing::info!(
                dir = %cache.disk.root().display(),
                entries = report.remaining_entries,
                bytes = report.remaining_bytes,
                expired = report.expired_removed,
                evicted = report.evicted_for_size,
                "stylesheet cache opened"
            ),
            Err(e) => tracing::warn!(error = %e, "initial disk cache gc failed"),
        }

        Ok(cache)
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Look `key` up in memory, then on disk. Disk hits are promoted into memory.
    ///
    /// Every call records exactly one of memory-hit, disk-hit or miss.
    pub async fn lookup(&self, key: &str) -> Result<Option<(Arc<CacheEntry>, Provenance)>, Error> {
        if let Some(entry) = self.memory.get(key, self.policy.ttl).await {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "stylesheet memory hit");
            return Ok(Some((entry, Provenance::MemoryHit)));
        }

        let on_disk = match self.disk.read(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "disk tier read failed, treating as miss");
                None
            }
        };

        if let Some(entry) = on_disk {
            if entry.is_expired(self.policy.ttl, Utc::now()) {
                tracing::debug!(key, stored_at = %entry.stored_at, "disk entry expired");
                if let Err(e) = self.disk.remove(key).await {
                    tracing::warn!(key, error = %e, "failed to remove expired disk entry");
                }
            } else {
                let entry = Arc::new(entry);
                self.memory.insert(entry.clone()).await;
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "stylesheet disk hit, promoted to memory");
                return Ok(Some((entry, Provenance::DiskHit)));
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "stylesheet cache miss");
        Ok(None)
    }

    /// Store freshly fetched content in both tiers.
    ///
    /// Blank content is rejected so that a failed download never becomes a
    /// cache entry. The disk write happens first; if it fails the memory tier
    /// is left untouched.
    pub async fn store(&self, key: &str, origin_url: &str, content: &str) -> Result<Arc<CacheEntry>, Error> {
        if content.trim().is_empty() {
            return Err(Error::EmptyContent(origin_url.to_string()));
        }

        let entry = Arc::new(CacheEntry::new(key, origin_url, content));
        self.disk.write(&entry).await?;
        self.memory.insert(entry.clone()).await;
        Ok(entry)
    }

    /// Count a completed network download.
    pub fn record_download(&self) {
        self.counters.downloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove one key or everything from both tiers. Idempotent.
    ///
    /// A full clear also resets the running counters.
    pub async fn invalidate(&self, target: &InvalidateTarget) -> Result<InvalidationReport, Error> {
        let report = match target {
            InvalidateTarget::Key(key) => {
                if !is_valid_key(key) {
                    return Err(Error::InvalidInput(format!("invalid cache key: {key}")));
                }
                let memory_removed = self.memory.remove(key).await as u64;
                let disk_removed = self.disk.remove(key).await? as u64;
                InvalidationReport { memory_removed, disk_removed }
            }
            InvalidateTarget::All => {
                let memory_removed = self.memory.clear().await as u64;
                let disk_removed = self.disk.clear().await?;
                self.counters.reset();
                InvalidationReport { memory_removed, disk_removed }
            }
        };

        tracing::info!(
            target = ?target,
            memory_removed = report.memory_removed,
            disk_removed = report.disk_removed,
            "stylesheet cache invalidated"
        );
        Ok(report)
    }

    /// Snapshot of counters and tier occupancy.
    pub async fn stats(&self) -> Result<CacheStats, Error> {
        let (memory_entries, memory_size_bytes) = self.memory.occupancy().await;
        let disk = self.disk.usage().await?;

        let memory_hits = self.counters.memory_hits.load(Ordering::Relaxed);
        let disk_hits = self.counters.disk_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total_requests = memory_hits + disk_hits + misses;
        let hit_rate = if total_requests == 0 { 0.0 } else { (memory_hits + disk_hits) as f64 / total_requests as f64 };

        Ok(CacheStats {
            memory_hits,
            disk_hits,
            misses,
            downloads: self.counters.downloads.load(Ordering::Relaxed),
            total_requests,
            hit_rate,
            memory_entries,
            memory_size_bytes,
            disk_entries: disk.entries,
            disk_size_bytes: disk.bytes,
        })
    }

    /// Run the disk eviction passes now.
    ///
    /// Entries GC removed from disk are dropped from memory as well, so memory
    /// never serves a key the disk tier no longer holds.
    pub async fn gc(&self) -> Result<GcReport, Error> {
        let report = self.disk.gc(&self.policy).await?;
        let mut dropped = 0;
        for key in &report.removed_keys {
            if self.memory.remove(key).await {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "memory entries dropped after disk gc");
        }
        Ok(report)
    }

    /// Re-run disk GC every `interval` until the handle is aborted.
    pub fn spawn_gc(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = cache.gc().await {
                    tracing::warn!(error = %e, "periodic disk cache gc failed");
                }
            }
        })
    }
}
