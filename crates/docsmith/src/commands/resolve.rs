//! `docsmith resolve` command implementation.

use std::path::PathBuf;

use clap::Args;
use docsmith_config::{CliSettings, Config, SourcesConfig};
use docsmith_sources::{FileResolver, ResolutionRequest, SourceLoader};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the resolve command.
#[derive(Args)]
pub(crate) struct ResolveArgs {
    /// Path to configuration file (default: auto-discover docsmith.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directories or files (overrides config).
    roots: Vec<PathBuf>,

    /// Include glob, repeatable (overrides config).
    #[arg(short, long = "include", value_name = "GLOB")]
    include: Vec<String>,

    /// Exclude glob, repeatable (overrides config).
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Ignore `.gitignore` rules.
    #[arg(long)]
    no_default_patterns: bool,

    /// Consider dot-files and dot-directories.
    #[arg(long)]
    hidden: bool,
}

impl ResolveArgs {
    /// Execute the resolve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails to load.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        let sources = &config.sources_resolved;

        let files = loader(sources).resolve(&request(sources)).await;
        if files.is_empty() {
            output.warning("No files matched");
        }
        for file in &files {
            output.result(&file.relative_path.display().to_string());
        }
        tracing::info!(count = files.len(), "Resolved source files");

        Ok(())
    }

    /// Only flags given on the command line override the config.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            roots: non_empty(&self.roots),
            include: non_empty(&self.include),
            exclude: non_empty(&self.exclude),
            use_default_patterns: self.no_default_patterns.then_some(false),
            include_hidden: self.hidden.then_some(true),
            ..Default::default()
        }
    }
}

fn non_empty<T: Clone>(values: &[T]) -> Option<Vec<T>> {
    (!values.is_empty()).then(|| values.to_vec())
}

/// Build a resolution request from the resolved sources section.
pub(crate) fn request(sources: &SourcesConfig) -> ResolutionRequest {
    ResolutionRequest {
        root_paths: sources.roots.clone(),
        include_patterns: sources.include.clone(),
        exclude_patterns: Some(sources.exclude.clone()),
        use_default_patterns: sources.use_default_patterns,
    }
}

pub(crate) fn loader(sources: &SourcesConfig) -> SourceLoader {
    SourceLoader::new(FileResolver::new().include_hidden(sources.include_hidden))
        .read_concurrency(sources.read_concurrency)
}
