//! Content-addressed asset store.
//!
//! [`AssetCache`] stores one file per cache key inside a single directory:
//!
//! ```text
//! {dir}/
//! +-- 3f1a...e9.svg    # {key}.{extension}
//! +-- 9c04...12.svg
//! ```
//!
//! Path existence is the only hit test. The key is derived from the content that
//! produced the asset, so an existing file is trusted without verification and is
//! never rewritten. New entries are written to a temporary sibling and renamed into
//! place, which keeps readers from observing partial files and makes racing writers
//! of the same key harmless (they produce identical bytes).
//!
//! Within one process, concurrent fills of the same key are coalesced: the first
//! caller generates, later callers wait and then observe a hit.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::CacheError;

/// Outcome of a cache lookup or fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    /// Path of the stored asset.
    pub path: PathBuf,
    /// True if the asset already existed and generation was skipped.
    pub hit: bool,
}

/// Failure while filling a cache entry.
#[derive(Debug, thiserror::Error)]
pub enum FillError<E: std::error::Error + 'static> {
    /// The generator failed; nothing was written.
    #[error(transparent)]
    Generate(E),
    /// The generated bytes could not be stored.
    #[error(transparent)]
    Store(#[from] CacheError),
}

/// Per-key locks for requests currently being filled.
type InFlight = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Directory-backed, write-once asset store.
pub struct AssetCache {
    dir: PathBuf,
    extension: String,
    in_flight: InFlight,
}

impl AssetCache {
    /// Create a store for files named `{key}.{extension}` inside `dir`.
    ///
    /// The directory is created lazily on the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the assets.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic path for a cache key.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{}", self.extension))
    }

    /// Whether an asset for `key` is already stored.
    ///
    /// Errors while checking are treated as a miss.
    pub async fn contains(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    /// Return the stored asset for `key`, generating and storing it on a miss.
    ///
    /// `generate` runs at most once per key among concurrent callers in this
    /// process, and never when the asset already exists.
    pub async fn get_or_insert_with<F, Fut, E>(
        &self,
        key: &str,
        generate: F,
    ) -> Result<CacheLookup, FillError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: std::error::Error + 'static,
    {
        let path = self.path_for(key);
        if self.contains(key).await {
            tracing::debug!("cache hit: {}", path.display());
            return Ok(CacheLookup { path, hit: true });
        }

        let key_lock = self.key_lock(key);
        let _guard = key_lock.lock.lock().await;
        self.fill_locked(key, path, generate).await
    }

    /// Re-check and fill while holding the key lock.
    async fn fill_locked<F, Fut, E>(
        &self,
        key: &str,
        path: PathBuf,
        generate: F,
    ) -> Result<CacheLookup, FillError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: std::error::Error + 'static,
    {
        // Another caller may have filled the key while we waited
        if self.contains(key).await {
            tracing::debug!("cache hit after wait: {}", path.display());
            return Ok(CacheLookup { path, hit: true });
        }

        tracing::debug!("cache miss: {}", path.display());
        let bytes = generate().await.map_err(FillError::Generate)?;
        self.write_once(&path, &bytes).await?;
        Ok(CacheLookup { path, hit: false })
    }

    /// Write `bytes` to `path` via a temporary sibling and an atomic rename.
    async fn write_once(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let tmp_path = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CacheError::io(&tmp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CacheError::io(path, e));
        }
        Ok(())
    }

    fn key_lock<'a>(&'a self, key: &'a str) -> KeyLock<'a> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        KeyLock {
            cache: self,
            key,
            lock: Arc::clone(in_flight.entry(key.to_owned()).or_default()),
        }
    }
}

/// A caller's share of a key's in-flight lock.
///
/// Dropping the last share removes the key's entry, also when the fill future
/// is dropped before it completes.
struct KeyLock<'a> {
    cache: &'a AssetCache,
    key: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map and this share remain
        if Arc::strong_count(&self.lock) == 2
            && in_flight
                .get(self.key)
                .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock))
        {
            in_flight.remove(self.key);
        }
    }
}
