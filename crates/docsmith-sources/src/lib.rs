//! Source file resolution for docsmith.
//!
//! This crate decides which files feed a generator. It handles:
//!
//! - Collecting `.gitignore` rules from a directory up to its git working tree root
//! - Translating ignore rules into path globs ([`IgnorePattern`])
//! - Walking roots with include/exclude globs and fixed default exclusions
//! - Loading several roots at once with per-root failure isolation
//!
//! File contents are never interpreted; they are read as opaque text.
//!
//! # Architecture
//!
//! - [`gitignore`]: `.gitignore` discovery along the directory ancestry
//! - [`pattern`]: ignore line to glob translation
//! - [`resolver`]: [`FileResolver`], glob matching over one root
//! - [`loader`]: [`SourceLoader`], multi-root resolution and content reads
//!
//! # Example
//!
//! ```ignore
//! use docsmith_sources::{ResolutionRequest, SourceLoader};
//!
//! let mut request = ResolutionRequest::new(vec!["src".into(), "README.md".into()]);
//! request.include_patterns = Some(vec!["*.rs".to_owned(), "*.md".to_owned()]);
//!
//! for file in SourceLoader::default().load(&request).await {
//!     println!("{}", file.relative_path.display());
//! }
//! ```

pub mod gitignore;
pub mod loader;
pub mod pattern;
pub mod resolver;

use std::path::PathBuf;

pub use loader::{
    DEFAULT_READ_CONCURRENCY, ResolutionRequest, ResolvedFile, SourceFile, SourceLoader,
    SourceRoot,
};
pub use pattern::{IgnorePattern, translate};
pub use resolver::{DEFAULT_EXCLUDES, FileResolver, merge_ignore_globs, normalize_include};

/// Resolution failure for a single root.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Filesystem error other than "not found".
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being inspected.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Include glob could not be compiled.
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        /// Pattern after normalization.
        pattern: String,
        /// Underlying glob error.
        #[source]
        source: glob::PatternError,
    },
}

impl ResolveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
