//! Durable on-disk tier.
//!
//! Each entry is a single `<key>.json` file under the cache directory holding
//! the stylesheet plus its metadata. Writes go through a temp file and a
//! rename so readers never observe a partial entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CacheEntry, CachePolicy, is_older_than};
use crate::Error;

const ENTRY_EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "tmp";

/// Temp files younger than this may belong to an in-flight write.
const STALE_TMP_AGE: Duration = Duration::from_secs(10 * 60);

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Header-only view of an entry file, used by GC and usage scans.
#[derive(Debug, Deserialize)]
struct EntryHeader {
    key: String,
    stored_at: DateTime<Utc>,
}

/// Result of one GC run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GcReport {
    /// Entries removed because they outlived the TTL.
    pub expired_removed: u64,
    /// Entries removed to get back under the size budget.
    pub evicted_for_size: u64,
    /// Corrupt entries and abandoned temp files removed.
    pub invalid_removed: u64,
    pub remaining_entries: u64,
    pub remaining_bytes: u64,
    /// Keys of live entries removed for age or size.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_keys: Vec<String>,
}

/// Entry count and total bytes on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub entries: u64,
    pub bytes: u64,
}

#[derive(Debug)]
struct GcCandidate {
    key: String,
    path: PathBuf,
    stored_at: DateTime<Utc>,
    len: u64,
}

/// On-disk tier rooted at a single directory.
#[derive(Debug, Clone)]
pub struct DiskTier {
    root: PathBuf,
}

impl DiskTier {
    /// Open (and create if needed) the tier directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Read an entry. Missing files are `None`; corrupt files are deleted and
    /// reported as `None`.
    pub async fn read(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt disk cache entry, removing");
                remove_best_effort(&path).await;
                return Ok(None);
            }
        };

        if entry.key != key {
            tracing::warn!(path = %path.display(), stored_key = %entry.key, "disk cache entry key mismatch, removing");
            remove_best_effort(&path).await;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Persist an entry atomically under its key.
    pub async fn write(&self, entry: &CacheEntry) -> Result<(), Error> {
        let path = self.entry_path(&entry.key);
        let bytes = serde_json::to_vec(entry).map_err(|e| Error::CacheIo(std::io::Error::other(e)))?;

        let tmp = self.root.join(format!(
            "{}.{}.{}.tmp",
            entry.key,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            remove_best_effort(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            remove_best_effort(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(key = %entry.key, bytes = bytes.len(), "disk cache entry written");
        Ok(())
    }

    /// Remove one entry. Returns whether a file was deleted.
    pub async fn remove(&self, key: &str) -> Result<bool, Error> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry file. Entries written concurrently may survive.
    pub async fn clear(&self) -> Result<u64, Error> {
        let mut removed = 0;
        for file in self.list_files().await? {
            if is_entry_file(&file.path) {
                match tokio::fs::remove_file(&file.path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }

    /// Count entries and their total size.
    pub async fn usage(&self) -> Result<DiskUsage, Error> {
        let mut usage = DiskUsage::default();
        for file in self.list_files().await? {
            if is_entry_file(&file.path) {
                usage.entries += 1;
                usage.bytes += file.len;
            }
        }
        Ok(usage)
    }

    /// Run both eviction passes: age first, then size budget.
    ///
    /// Oldest-stored entries go first when over budget. Unreadable entries and
    /// abandoned temp files are deleted on the way.
    pub async fn gc(&self, policy: &CachePolicy) -> Result<GcReport, Error> {
        let now = Utc::now();
        let mut report = GcReport::default();
        let mut candidates = Vec::new();
        let mut total_bytes: u64 = 0;

        for ListedFile { path, len, modified } in self.list_files().await? {
            if !is_entry_file(&path) {
                let abandoned = modified
                    .and_then(|m| SystemTime::now().duration_since(m).ok())
                    .is_some_and(|age| age > STALE_TMP_AGE);
                if is_tmp_file(&path) && abandoned && remove_best_effort(&path).await {
                    report.invalid_removed += 1;
                }
                continue;
            }

            let Some(header) = read_header(&path).await else {
                if remove_best_effort(&path).await {
                    report.invalid_removed += 1;
                }
                continue;
            };

            if path.file_stem().and_then(|s| s.to_str()) != Some(header.key.as_str()) {
                if remove_best_effort(&path).await {
                    report.invalid_removed += 1;
                }
                continue;
            }

            if is_older_than(header.stored_at, policy.ttl, now) {
                if remove_best_effort(&path).await {
                    report.expired_removed += 1;
                    report.removed_keys.push(header.key);
                }
                continue;
            }

            total_bytes = total_bytes.saturating_add(len);
            candidates.push(GcCandidate { key: header.key, path, stored_at: header.stored_at, len });
        }

        if total_bytes > policy.disk_max_bytes {
            candidates.sort_by_key(|c| c.stored_at);
            let mut kept = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                if total_bytes > policy.disk_max_bytes && remove_best_effort(&candidate.path).await {
                    total_bytes = total_bytes.saturating_sub(candidate.len);
                    report.evicted_for_size += 1;
                    report.removed_keys.push(candidate.key);
                } else {
                    kept.push(candidate);
                }
            }
            candidates = kept;
        }

        report.remaining_entries = candidates.len() as u64;
        report.remaining_bytes = total_bytes;

        tracing::debug!(
            expired = report.expired_removed,
            evicted = report.evicted_for_size,
            invalid = report.invalid_removed,
            remaining = report.remaining_entries,
            bytes = report.remaining_bytes,
            "disk cache gc finished"
        );

        Ok(report)
    }

    /// Regular files directly under the root.
    async fn list_files(&self) -> Result<Vec<ListedFile>, Error> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if meta.is_file() {
                files.push(ListedFile { path: entry.path(), len: meta.len(), modified: meta.modified().ok() });
            }
        }
        Ok(files)
    }
}

struct ListedFile {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
}

fn is_tmp_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TMP_EXTENSION)
}

async fn read_header(path: &Path) -> Option<EntryHeader> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

async fn remove_best_effort(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file");
            false
        }
    }
}
