//! Translation of `.gitignore` lines into path globs.
//!
//! Each ignore line becomes an [`IgnorePattern`] holding the raw line and the
//! globs that reproduce its matching behavior when applied to paths relative to
//! a resolution root:
//!
//! | Line          | Globs                                                |
//! |---------------|------------------------------------------------------|
//! | `build`       | `build`, `build/**`, `**/build`, `**/build/**`       |
//! | `build/`      | `build/**`, `**/build/**`                            |
//! | `*.log`       | `*.log`, `**/*.log`                                  |
//! | `/dist`       | same as `dist` (anchoring is not preserved)          |
//!
//! Negation lines (`!pattern`) are not translated; see [`IgnorePattern::parse`].

/// A single `.gitignore` rule and the globs it expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnorePattern {
    /// Line as it appeared in the ignore file (trailing whitespace removed).
    pub raw: String,
    /// Globs matching the same paths, never empty.
    pub globs: Vec<String>,
}

impl IgnorePattern {
    /// Parse one ignore-file line.
    ///
    /// Returns `None` for lines that carry no rule: blanks, comments (`#`),
    /// negations (`!pattern`), and a bare `/`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let raw = line.trim_end();
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        if trimmed.starts_with('!') {
            tracing::debug!("negation pattern not supported, skipping: {trimmed}");
            return None;
        }

        let globs = translate(trimmed);
        if globs.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.to_owned(),
            globs,
        })
    }
}

/// Expand a non-comment ignore line into globs.
///
/// A single leading `/` is dropped. Lines without `*`/`?` match the name itself
/// and everything beneath it at any depth; a trailing `/` restricts the match to
/// directory contents; wildcard lines match as written and at any depth.
#[must_use]
pub fn translate(line: &str) -> Vec<String> {
    let line = line.strip_prefix('/').unwrap_or(line);

    if let Some(dir) = line.strip_suffix('/') {
        if dir.is_empty() {
            return Vec::new();
        }
        return vec![format!("{dir}/**"), format!("**/{dir}/**")];
    }
    if line.is_empty() {
        return Vec::new();
    }

    if !line.contains(['*', '?']) {
        return vec![
            line.to_owned(),
            format!("{line}/**"),
            format!("**/{line}"),
            format!("**/{line}/**"),
        ];
    }

    if line.starts_with("**/") {
        vec![line.to_owned()]
    } else {
        vec![line.to_owned(), format!("**/{line}")]
    }
}
