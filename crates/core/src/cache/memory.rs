//! Bounded in-memory tier.
//!
//! Backed by an [`LruCache`] that is only ever read with `peek`, so recency
//! never changes on lookup and overflow evicts the oldest inserted entry.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use tokio::sync::Mutex;

use super::CacheEntry;

/// Insertion-ordered memory tier.
pub struct MemoryTier {
    entries: Mutex<LruCache<String, Arc<CacheEntry>>>,
    capacity: NonZeroUsize,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Get a live entry. Expired entries are dropped and reported as absent.
    pub async fn get(&self, key: &str, ttl: Duration) -> Option<Arc<CacheEntry>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.peek(key)?.clone();
        if entry.is_expired(ttl, Utc::now()) {
            entries.pop(key);
            tracing::debug!(key, "memory tier entry expired");
            return None;
        }
        Some(entry)
    }

    /// Insert an entry, returning the key evicted to make room (if any).
    pub async fn insert(&self, entry: Arc<CacheEntry>) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let key = entry.key.clone();
        match entries.push(key.clone(), entry) {
            Some((evicted, _)) if evicted != key => {
                tracing::debug!(evicted = %evicted, "memory tier full, evicted oldest entry");
                Some(evicted)
            }
            _ => None,
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    /// Drop every entry, returning how many were held.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains(key)
    }

    /// Entry count and aggregate content size.
    pub async fn occupancy(&self) -> (u64, u64) {
        let entries = self.entries.lock().await;
        let size = entries.iter().map(|(_, entry)| entry.size_bytes).sum();
        (entries.len() as u64, size)
    }
}
