//! On-disk layout of the asset cache.
//!
//! ```text
//! {parent}/
//! +-- .gitignore               # "**/*", keeps generated assets out of git
//! +-- {tmp_root}/
//!     +-- assets/
//!         +-- mermaid/         # one directory per renderer kind
//!         |   +-- {hash}.svg
//!         +-- plantuml/
//!             +-- ...
//! ```

use std::path::{Path, PathBuf};

use crate::CacheError;

/// Contents of the `.gitignore` written next to the temporary root.
const GITIGNORE_CONTENT: &str = "**/*\n";

/// Paths of the cache's temporary root and its asset directories.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    tmp_root: PathBuf,
}

impl CacheLayout {
    /// Create a layout rooted at `tmp_root` (e.g., `.docsmith/tmp`).
    #[must_use]
    pub fn new(tmp_root: impl Into<PathBuf>) -> Self {
        Self {
            tmp_root: tmp_root.into(),
        }
    }

    /// Temporary root directory.
    #[must_use]
    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    /// Asset directory for a renderer kind: `{tmp_root}/assets/{kind}`.
    #[must_use]
    pub fn asset_dir(&self, kind: &str) -> PathBuf {
        self.tmp_root.join("assets").join(kind)
    }

    /// Create the temporary root and the `.gitignore` beside it.
    ///
    /// The `.gitignore` is written into the parent of the temporary root only if
    /// it does not exist yet. A temporary root without a parent directory gets no
    /// `.gitignore`, since writing one into the working directory would hide the
    /// whole project from git.
    pub async fn ensure(&self) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.tmp_root)
            .await
            .map_err(|e| CacheError::io(&self.tmp_root, e))?;

        let Some(parent) = self
            .tmp_root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        else {
            tracing::debug!(
                "cache root {} has no parent, skipping .gitignore",
                self.tmp_root.display()
            );
            return Ok(());
        };

        let gitignore = parent.join(".gitignore");
        let exists = tokio::fs::try_exists(&gitignore)
            .await
            .map_err(|e| CacheError::io(&gitignore, e))?;
        if !exists {
            tokio::fs::write(&gitignore, GITIGNORE_CONTENT)
                .await
                .map_err(|e| CacheError::io(&gitignore, e))?;
            tracing::debug!("created {}", gitignore.display());
        }
        Ok(())
    }
}
