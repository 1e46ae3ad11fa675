//! Diagram cache key computation.
//!
//! Provides [`DiagramKey`] for computing content-based hashes used as cache keys,
//! and [`normalize_source`] for canonicalizing diagram text before hashing.

use docsmith_cache::content_hash;

use crate::language::{DiagramFormat, DiagramKind};

/// Diagram parameters for cache key computation.
///
/// Contains every input that affects the rendered bytes, so a change to any of
/// them results in a different key rather than a stale hit.
#[derive(Debug, Clone, Copy)]
pub struct DiagramKey<'a> {
    /// Normalized diagram source.
    pub source: &'a str,
    /// Diagram kind (e.g., mermaid).
    pub kind: DiagramKind,
    /// Output format.
    pub format: DiagramFormat,
    /// Renderer settings that influence output (see [`Renderer::fingerprint`]).
    ///
    /// [`Renderer::fingerprint`]: crate::Renderer::fingerprint
    pub fingerprint: &'a str,
}

impl DiagramKey<'_> {
    /// Compute a content hash for this diagram key.
    ///
    /// # Hash Format
    ///
    /// SHA-256 of kind, format, fingerprint and source, each written as
    /// `"{len}:{value}"`, hex-encoded. The length prefix keeps a separator
    /// inside one field from shifting bytes into the next.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let fields = [
            self.kind.as_str(),
            self.format.as_str(),
            self.fingerprint,
            self.source,
        ];
        let mut input = String::new();
        for field in fields {
            input.push_str(&field.len().to_string());
            input.push(':');
            input.push_str(field);
        }
        content_hash(input)
    }
}

/// Canonicalize diagram text so that insignificant differences share a key.
///
/// Converts CRLF to LF, strips trailing whitespace from every line, and drops
/// leading and trailing blank lines.
#[must_use]
pub fn normalize_source(source: &str) -> String {
    source
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_owned()
}
