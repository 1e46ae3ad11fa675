//! Content digest used for cache-key derivation.

use sha2::{Digest, Sha256};

/// Compute a hex-encoded SHA-256 digest of `content`.
///
/// Pure and deterministic: equal inputs always produce equal 64-character keys.
/// Callers fold every input that affects the cached output into `content`.
#[must_use]
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    let result = hasher.finalize();
    hex::encode(result)
}
