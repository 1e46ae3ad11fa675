//! Collection of `.gitignore` rules along a directory's ancestry.
//!
//! [`collect`] reads the `.gitignore` of the start directory and of every parent
//! up to the root of the enclosing git working tree. Rules from deeper
//! directories come first. Matching later treats the result as a plain union, so
//! the order only affects how the rules are listed.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::ResolveError;
use crate::pattern::IgnorePattern;

/// Ignore file name looked up at every level.
const GITIGNORE: &str = ".gitignore";

/// Collect ignore rules for `start_dir`.
///
/// Inside a git working tree, every `.gitignore` from `start_dir` up to and
/// including the tree root is read. Outside a working tree only
/// `start_dir/.gitignore` is considered.
///
/// Returns `Ok(None)` when no `.gitignore` exists on the walk (or `start_dir`
/// itself does not exist), and `Ok(Some(_))` otherwise, possibly empty when the
/// files hold no rules. Unreadable ignore files are skipped.
///
/// # Errors
///
/// Returns [`ResolveError::Io`] if `start_dir` cannot be resolved for a reason
/// other than not existing (e.g., permission denied).
pub async fn collect(start_dir: &Path) -> Result<Option<Vec<IgnorePattern>>, ResolveError> {
    let start = match tokio::fs::canonicalize(start_dir).await {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ResolveError::io(start_dir, e)),
    };

    let dirs = match worktree_root(&start).await {
        Some(root) => ancestors_up_to(&start, &root),
        None => vec![start],
    };

    let mut found_any = false;
    let mut seen = HashSet::new();
    let mut patterns = Vec::new();
    for dir in dirs {
        let path = dir.join(GITIGNORE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::debug!("skipping unreadable {}: {e}", path.display());
                continue;
            }
        };
        found_any = true;
        for pattern in content.lines().filter_map(IgnorePattern::parse) {
            if seen.insert(pattern.raw.clone()) {
                patterns.push(pattern);
            }
        }
    }

    Ok(found_any.then_some(patterns))
}

/// Root of the git working tree containing `dir`, if any.
///
/// Any discovery failure (no repository, bare repository, unreadable git
/// directory) is treated as "not in a working tree".
async fn worktree_root(dir: &Path) -> Option<PathBuf> {
    let dir = dir.to_path_buf();
    let discovered = tokio::task::spawn_blocking(move || {
        let repo = gix::discover(&dir).ok()?;
        let workdir = repo.workdir()?;
        std::fs::canonicalize(workdir).ok()
    })
    .await;

    match discovered {
        Ok(root) => root,
        Err(e) => {
            tracing::debug!("git root discovery task failed: {e}");
            None
        }
    }
}

/// Directories from `start` up to and including `root`, deepest first.
///
/// Falls back to `[start]` if `start` is not beneath `root`.
fn ancestors_up_to(start: &Path, root: &Path) -> Vec<PathBuf> {
    if !start.starts_with(root) {
        return vec![start.to_path_buf()];
    }
    start
        .ancestors()
        .take_while(|dir| dir.starts_with(root))
        .map(Path::to_path_buf)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn raw_lines(patterns: &[IgnorePattern]) -> Vec<&str> {
        patterns.iter().map(|p| p.raw.as_str()).collect()
    }

    #[test]
    fn test_ancestors_up_to() {
        let dirs = ancestors_up_to(Path::new("/repo/a/b"), Path::new("/repo"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/repo/a/b"),
                PathBuf::from("/repo/a"),
                PathBuf::from("/repo"),
            ]
        );
    }

    #[test]
    fn test_ancestors_up_to_outside_root() {
        let dirs = ancestors_up_to(Path::new("/elsewhere"), Path::new("/repo"));
        assert_eq!(dirs, vec![PathBuf::from("/elsewhere")]);
    }

    #[tokio::test]
    async fn test_collect_outside_repository_reads_only_start_dir() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "parent-rule\n").unwrap();
        let start = tmp.path().join("pkg");
        fs::create_dir(&start).unwrap();
        fs::write(start.join(".gitignore"), "*.log\n# comment\n\nbuild/\n").unwrap();

        let patterns = collect(&start).await.unwrap().unwrap();

        assert_eq!(raw_lines(&patterns), vec!["*.log", "build/"]);
    }

    #[tokio::test]
    async fn test_collect_walks_up_to_worktree_root() {
        let tmp = TempDir::new().unwrap();
        gix::init(tmp.path()).unwrap();
        fs::write(tmp.path().join(".gitignore"), "node_modules/\nshared\n").unwrap();
        let nested = tmp.path().join("packages/app");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(".gitignore"), "dist\nshared\n").unwrap();

        let patterns = collect(&nested).await.unwrap().unwrap();

        // Deeper rules first, duplicates removed
        assert_eq!(raw_lines(&patterns), vec!["dist", "shared", "node_modules/"]);
    }

    #[tokio::test]
    async fn test_collect_stops_at_worktree_root() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "outside\n").unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir(&repo).unwrap();
        gix::init(&repo).unwrap();
        fs::write(repo.join(".gitignore"), "inside\n").unwrap();
        let nested = repo.join("src");
        fs::create_dir(&nested).unwrap();

        let patterns = collect(&nested).await.unwrap().unwrap();

        assert_eq!(raw_lines(&patterns), vec!["inside"]);
    }

    #[tokio::test]
    async fn test_collect_returns_none_without_gitignore() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(collect(tmp.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_collect_empty_gitignore_is_some_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "# nothing here\n").unwrap();

        assert_eq!(collect(tmp.path()).await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_collect_missing_start_dir() {
        let result = collect(Path::new("/does/not/exist")).await.unwrap();
        assert_eq!(result, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_skips_unreadable_gitignore() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        gix::init(tmp.path()).unwrap();
        fs::write(tmp.path().join(".gitignore"), "root-rule\n").unwrap();
        let nested = tmp.path().join("pkg");
        fs::create_dir(&nested).unwrap();
        let locked = nested.join(".gitignore");
        fs::write(&locked, "locked-rule\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&locked).is_ok() {
            // Permission bits are not enforced (running as root)
            return;
        }

        let patterns = collect(&nested).await.unwrap().unwrap();

        assert_eq!(raw_lines(&patterns), vec!["root-rule"]);
    }
}
