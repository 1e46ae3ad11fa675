//! CLI error types.

use std::path::PathBuf;

use docsmith_cache::CacheError;
use docsmith_config::ConfigError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{failed} of {total} documents failed to render")]
    Render { failed: usize, total: usize },
}
