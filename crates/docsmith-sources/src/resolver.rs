//! Glob-based file resolution under a root directory.
//!
//! [`FileResolver`] walks a root directory asynchronously and returns the absolute
//! paths of regular files whose root-relative path matches at least one include
//! glob and no ignore glob. Paths are matched with `/` separators, case-sensitively,
//! and `*` never crosses a directory boundary (`**` does).
//!
//! Directories are pruned early when an ignore glob of the form `{dir}/**` covers
//! them, so large ignored trees such as `node_modules` are never read.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::ResolveError;

/// Exclusions applied to every resolution, regardless of caller patterns.
pub const DEFAULT_EXCLUDES: [&str; 3] = ["node_modules/**", "test/**", "temp/**"];

/// Include glob used when the caller supplies none.
const MATCH_ALL: &str = "**/*";

/// Rewrite an include glob so that unanchored patterns match at any depth.
///
/// Patterns starting with `/` or `**` are kept; everything else gets a `**/`
/// prefix, so `*.js` behaves as a file-name filter.
#[must_use]
pub fn normalize_include(pattern: &str) -> String {
    if pattern.starts_with('/') || pattern.starts_with("**") {
        pattern.to_owned()
    } else {
        format!("**/{pattern}")
    }
}

/// Build the final ignore set: caller excludes, translated ignore globs, then the
/// fixed default excludes, each added only once and in first-seen order.
#[must_use]
pub fn merge_ignore_globs(exclude: &[String], ignore: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    exclude
        .iter()
        .map(String::as_str)
        .chain(ignore.iter().map(String::as_str))
        .chain(DEFAULT_EXCLUDES)
        .filter(|glob| seen.insert(*glob))
        .map(str::to_owned)
        .collect()
}

/// Compiled ignore globs plus the directory prefixes that allow pruning.
struct IgnoreSet {
    patterns: Vec<Pattern>,
    /// `{dir}` of every `{dir}/**` glob.
    dir_patterns: Vec<Pattern>,
}

impl IgnoreSet {
    /// Compile ignore globs, skipping (and logging) invalid ones.
    fn compile(globs: &[String]) -> Self {
        let mut patterns = Vec::with_capacity(globs.len());
        let mut dir_patterns = Vec::new();
        for glob in globs {
            match Pattern::new(glob) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => {
                    tracing::warn!("ignoring invalid exclude pattern '{glob}': {e}");
                    continue;
                }
            }
            if let Some(dir) = glob.strip_suffix("/**").filter(|d| !d.is_empty())
                && let Ok(pattern) = Pattern::new(dir)
            {
                dir_patterns.push(pattern);
            }
        }
        Self {
            patterns,
            dir_patterns,
        }
    }

    fn ignores_file(&self, rel_path: &str, options: MatchOptions) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(rel_path, options))
    }

    fn prunes_dir(&self, rel_path: &str, options: MatchOptions) -> bool {
        self.dir_patterns
            .iter()
            .any(|p| p.matches_with(rel_path, options))
    }
}

/// Resolves the files under a root that match include globs and escape all
/// ignore globs.
///
/// # Example
///
/// ```ignore
/// use docsmith_sources::FileResolver;
///
/// let resolver = FileResolver::new();
/// let files = resolver
///     .resolve("project".as_ref(), &["*.rs".to_owned()], &[], &[])
///     .await?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct FileResolver {
    include_hidden: bool,
}

impl FileResolver {
    /// Create a resolver that skips hidden entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include entries whose name starts with `.` (default: false).
    #[must_use]
    pub fn include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    /// Resolve the files under `root`.
    ///
    /// - `include`: globs a file must match (empty means every file); see
    ///   [`normalize_include`]
    /// - `exclude`: caller exclusions
    /// - `ignore`: globs translated from `.gitignore` rules
    ///
    /// [`DEFAULT_EXCLUDES`] always apply. The root is canonicalized first, so
    /// returned paths contain no `.` or `..` components. A root that does not
    /// exist yields an empty list. A root that is a regular file is returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Io`] if the root cannot be inspected or listed
    /// for a reason other than not existing, and [`ResolveError::Pattern`] for
    /// an invalid include glob. Unreadable subdirectories are skipped.
    pub async fn resolve(
        &self,
        root: &Path,
        include: &[String],
        exclude: &[String],
        ignore: &[String],
    ) -> Result<Vec<PathBuf>, ResolveError> {
        let root = match tokio::fs::canonicalize(root).await {
            Ok(root) => root,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("root {} does not exist", root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(ResolveError::io(root, e)),
        };
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| ResolveError::io(&root, e))?;
        if metadata.is_file() {
            return Ok(vec![root]);
        }

        let includes = compile_includes(include)?;
        let ignores = IgnoreSet::compile(&merge_ignore_globs(exclude, ignore));
        let mut files = self.walk(&root, &includes, &ignores).await?;
        files.sort();
        Ok(files)
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: !self.include_hidden,
        }
    }

    /// Iterative walk; only a failure to list the root itself is an error.
    async fn walk(
        &self,
        root: &Path,
        includes: &[Pattern],
        ignores: &IgnoreSet,
    ) -> Result<Vec<PathBuf>, ResolveError> {
        let options = self.match_options();
        let mut files = Vec::new();
        let mut pending = vec![(root.to_path_buf(), String::new())];

        while let Some((dir, rel_dir)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if rel_dir.is_empty() => return Err(ResolveError::io(&dir, e)),
                Err(e) => {
                    tracing::warn!("skipping unreadable directory {}: {e}", dir.display());
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("error listing {}: {e}", dir.display());
                        break;
                    }
                };

                let name = entry.file_name().to_string_lossy().into_owned();
                if !self.include_hidden && name.starts_with('.') {
                    continue;
                }
                let rel_path = if rel_dir.is_empty() {
                    name
                } else {
                    format!("{rel_dir}/{name}")
                };

                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                let path = entry.path();

                if file_type.is_dir() {
                    if !ignores.prunes_dir(&rel_path, options) {
                        pending.push((path, rel_path));
                    }
                    continue;
                }

                // Symlinks count when they point at a regular file
                let is_file = file_type.is_file()
                    || (file_type.is_symlink()
                        && tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()));
                if is_file
                    && includes.iter().any(|p| p.matches_with(&rel_path, options))
                    && !ignores.ignores_file(&rel_path, options)
                {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }
}

/// Compile include globs, defaulting to every file.
fn compile_includes(include: &[String]) -> Result<Vec<Pattern>, ResolveError> {
    if include.is_empty() {
        return Ok(vec![Pattern::new(MATCH_ALL).map_err(|source| {
            ResolveError::Pattern {
                pattern: MATCH_ALL.to_owned(),
                source,
            }
        })?]);
    }
    include
        .iter()
        .map(|raw| {
            let pattern = normalize_include(raw);
            Pattern::new(&pattern).map_err(|source| ResolveError::Pattern { pattern, source })
        })
        .collect()
}
