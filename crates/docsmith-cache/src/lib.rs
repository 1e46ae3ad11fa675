//! Content hashing and content-addressed asset storage for docsmith.
//!
//! This crate provides the two building blocks used to avoid repeating expensive,
//! deterministic work across runs:
//!
//! - [`content_hash`]: Stable SHA-256 digest of arbitrary bytes, used as a cache key
//! - [`AssetCache`]: Directory-backed, write-once store addressed by cache key
//! - [`CacheLayout`]: On-disk layout of the temporary root that holds asset directories
//!
//! Entries are immutable. A key maps to exactly one path and generation is skipped
//! whenever that path already exists, so staleness is handled by changing the
//! hashed content rather than by invalidation.
//!
//! # Example
//!
//! ```
//! use docsmith_cache::content_hash;
//!
//! let key = content_hash("graph TD; A-->B");
//! assert_eq!(key.len(), 64);
//! assert_eq!(key, content_hash("graph TD; A-->B"));
//! ```

mod hash;
mod layout;
mod store;

pub use hash::content_hash;
pub use layout::CacheLayout;
pub use store::{AssetCache, CacheLookup, FillError};

use std::path::PathBuf;

/// Cache I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem operation failed on a cache path.
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
