//! Request-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// `vary_headers` is the fixed header set the request is sent with, so the
/// same URL fetched as a page and as an image land in different entries.
pub fn compute_cache_key(method: &str, url: &str, vary_headers: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary_headers.as_bytes());
    hex::encode(hasher.finalize())
}
