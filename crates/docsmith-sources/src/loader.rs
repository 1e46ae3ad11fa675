//! Multi-root source loading.
//!
//! [`SourceLoader`] turns a [`ResolutionRequest`] into the file list handed to a
//! generator. Every root is resolved independently: directory roots go through
//! `.gitignore` collection and the [`FileResolver`], file roots are taken as-is.
//! Per-root results are folded into one deduplicated list; a failing root is
//! logged and contributes nothing, while the other roots continue.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::future::join_all;

use crate::ResolveError;
use crate::gitignore;
use crate::resolver::FileResolver;

/// Default number of files read concurrently.
pub const DEFAULT_READ_CONCURRENCY: usize = 16;

/// A caller-supplied path to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    /// Absolute path of the root.
    pub path: PathBuf,
    /// True for a single file, which bypasses pattern filtering.
    pub is_file: bool,
}

impl SourceRoot {
    /// Inspect `path` on disk.
    ///
    /// The path is canonicalized, so differently spelled roots naming the same
    /// entry compare equal. Returns `Ok(None)` if nothing exists at `path`.
    pub async fn inspect(path: &Path) -> Result<Option<Self>, ResolveError> {
        let path = match tokio::fs::canonicalize(path).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ResolveError::io(path, e)),
        };
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ResolveError::io(&path, e))?;
        Ok(Some(Self {
            is_file: metadata.is_file(),
            path,
        }))
    }
}

/// What to resolve and how.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    /// Files or directories to scan.
    pub root_paths: Vec<PathBuf>,
    /// Include globs; `None` matches every file.
    pub include_patterns: Option<Vec<String>>,
    /// Additional exclusion globs.
    pub exclude_patterns: Option<Vec<String>>,
    /// Whether `.gitignore` rules of each directory root are applied.
    pub use_default_patterns: bool,
}

impl ResolutionRequest {
    /// Request scanning `root_paths` with default patterns and no filters.
    #[must_use]
    pub fn new(root_paths: Vec<PathBuf>) -> Self {
        Self {
            root_paths,
            include_patterns: None,
            exclude_patterns: None,
            use_default_patterns: true,
        }
    }
}

/// A resolved file, without content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Absolute path, unique within one resolution.
    pub absolute_path: PathBuf,
    /// Path relative to the working directory, or absolute when outside it.
    pub relative_path: PathBuf,
}

/// A resolved file with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path, unique within one resolution.
    pub absolute_path: PathBuf,
    /// Path relative to the working directory, or absolute when outside it.
    pub relative_path: PathBuf,
    /// File content (invalid UTF-8 sequences replaced).
    pub content: String,
}

/// Resolves requests across several roots and reads the resulting files.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    resolver: FileResolver,
    read_concurrency: usize,
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new(FileResolver::new())
    }
}

impl SourceLoader {
    /// Create a loader around `resolver`.
    #[must_use]
    pub fn new(resolver: FileResolver) -> Self {
        Self {
            resolver,
            read_concurrency: DEFAULT_READ_CONCURRENCY,
        }
    }

    /// Set the number of files read concurrently (minimum 1).
    #[must_use]
    pub fn read_concurrency(mut self, read_concurrency: usize) -> Self {
        self.read_concurrency = read_concurrency.max(1);
        self
    }

    /// Resolve every root and return the deduplicated file list.
    ///
    /// Never fails as a whole: a root that errors is logged and skipped.
    pub async fn resolve(&self, request: &ResolutionRequest) -> Vec<ResolvedFile> {
        let results = join_all(
            request
                .root_paths
                .iter()
                .map(|root| self.resolve_root(root, request)),
        )
        .await;

        let cwd = std::env::current_dir().ok();
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for (root, result) in request.root_paths.iter().zip(results) {
            match result {
                Ok(paths) => {
                    for path in paths {
                        if seen.insert(path.clone()) {
                            files.push(ResolvedFile {
                                relative_path: relative_to(&path, cwd.as_deref()),
                                absolute_path: path,
                            });
                        }
                    }
                }
                Err(e) => tracing::warn!("failed to resolve root {}: {e}", root.display()),
            }
        }
        files
    }

    /// Resolve every root and read the content of each file.
    ///
    /// Files that cannot be read are logged and left out. The result is
    /// sorted by absolute path.
    pub async fn load(&self, request: &ResolutionRequest) -> Vec<SourceFile> {
        let resolved = self.resolve(request).await;

        let mut files: Vec<SourceFile> = futures::stream::iter(resolved)
            .map(|file| async move {
                match tokio::fs::read(&file.absolute_path).await {
                    Ok(bytes) => Some(SourceFile {
                        content: String::from_utf8_lossy(&bytes).into_owned(),
                        absolute_path: file.absolute_path,
                        relative_path: file.relative_path,
                    }),
                    Err(e) => {
                        tracing::warn!("failed to read {}: {e}", file.absolute_path.display());
                        None
                    }
                }
            })
            .buffer_unordered(self.read_concurrency)
            .filter_map(std::future::ready)
            .collect()
            .await;

        files.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
        files
    }

    async fn resolve_root(
        &self,
        root: &Path,
        request: &ResolutionRequest,
    ) -> Result<Vec<PathBuf>, ResolveError> {
        let Some(root) = SourceRoot::inspect(root).await? else {
            tracing::debug!("root {} does not exist", root.display());
            return Ok(Vec::new());
        };
        if root.is_file {
            return Ok(vec![root.path]);
        }

        let ignore = if request.use_default_patterns {
            gitignore::collect(&root.path)
                .await?
                .into_iter()
                .flatten()
                .flat_map(|pattern| pattern.globs)
                .collect()
        } else {
            Vec::new()
        };

        self.resolver
            .resolve(
                &root.path,
                request.include_patterns.as_deref().unwrap_or_default(),
                request.exclude_patterns.as_deref().unwrap_or_default(),
                &ignore,
            )
            .await
    }
}

/// Express `path` relative to `base` when it lies beneath it.
fn relative_to(path: &Path, base: Option<&Path>) -> PathBuf {
    base.and_then(|base| path.strip_prefix(base).ok())
        .map_or_else(|| path.to_path_buf(), Path::to_path_buf)
}
