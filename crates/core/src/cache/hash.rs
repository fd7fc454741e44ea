//! Content-independent cache keys for stylesheet sources.

use sha2::{Digest, Sha256};

/// Compute the cache key for a stylesheet source URL.
///
/// The key only depends on the URL, so the same source maps to the same
/// entry in both tiers regardless of what the server returns.
pub fn stylesheet_key(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"stylesheet\n");
    hasher.update(source_url.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `key` has the shape produced by [`stylesheet_key`].
///
/// Keys become file names in the disk tier, so anything else is rejected
/// before touching the filesystem.
pub fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
