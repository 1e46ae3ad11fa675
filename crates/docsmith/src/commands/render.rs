//! `docsmith render` command implementation.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use docsmith_cache::CacheLayout;
use docsmith_config::{CliSettings, Config, DiagramsConfig, RendererConfig, SourcesConfig};
use docsmith_diagrams::{
    CommandRenderer, DiagramFormat, DiagramKind, DiagramProcessor, KrokiRenderer, RenderGateway,
    Renderer,
};
use docsmith_sources::{ResolutionRequest, SourceFile};

use super::resolve::{loader, request};
use crate::error::CliError;
use crate::output::Output;

/// Include globs used when the configuration names none.
const DOCUMENT_INCLUDES: [&str; 2] = ["*.md", "*.markdown"];

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Path to configuration file (default: auto-discover docsmith.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Markdown files or directories (default: configured source roots).
    files: Vec<PathBuf>,

    /// Directory for rewritten documents (default: print to stdout).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Kroki server URL for diagram rendering (overrides config).
    #[arg(long, env = "DOCSMITH_KROKI_URL")]
    kroki_url: Option<String>,

    /// Fail a document when one of its diagrams cannot be rendered.
    #[arg(long)]
    strict: bool,

    /// Cache temp root (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the cache cannot be
    /// prepared, an output cannot be written, or any document fails in strict mode.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let cli_settings = CliSettings {
            roots: (!self.files.is_empty()).then(|| self.files.clone()),
            kroki_url: self.kroki_url.clone(),
            strict: self.strict.then_some(true),
            cache_dir: self.cache_dir.clone(),
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let diagrams = config.require_diagrams()?;

        let kind = DiagramKind::parse(&diagrams.kind).ok_or_else(|| {
            CliError::Validation(format!("unknown diagram kind \"{}\"", diagrams.kind))
        })?;
        let format = DiagramFormat::parse(&diagrams.format).ok_or_else(|| {
            CliError::Validation(format!("unknown diagram format \"{}\"", diagrams.format))
        })?;

        let layout = CacheLayout::new(std::path::absolute(&config.cache_dir)?);
        layout.ensure().await?;
        output.info(&format!("Cache directory: {}", layout.tmp_root().display()));

        let out = self.out.as_deref().map(std::path::absolute).transpose()?;
        let gateway = RenderGateway::new(build_renderer(diagrams, kind, format), &layout, kind, format)
            .concurrency(diagrams.concurrency);
        let processor = DiagramProcessor::new(Arc::new(gateway)).strict(diagrams.strict);

        let sources = &config.sources_resolved;
        let documents = loader(sources).load(&document_request(sources)).await;
        if documents.is_empty() {
            output.warning("No documents to render");
            return Ok(());
        }

        let batch: Vec<(&str, PathBuf)> = documents
            .iter()
            .map(|doc| (doc.content.as_str(), document_base(out.as_deref(), doc)))
            .collect();
        let results = processor.process_batch_in(&batch).await;

        let mut failed = 0;
        for (document, result) in documents.iter().zip(results) {
            let rendered = match result {
                Ok(rendered) => rendered,
                Err(e) => {
                    output.error(&format!("{}: {e}", document.relative_path.display()));
                    failed += 1;
                    continue;
                }
            };
            match &out {
                Some(out) => {
                    let target = output_path(out, &document.relative_path);
                    write_document(&target, &rendered).await?;
                    tracing::info!(path = %target.display(), "Wrote document");
                }
                None => output.document(&rendered),
            }
        }

        if failed > 0 {
            return Err(CliError::Render {
                failed,
                total: documents.len(),
            });
        }
        if self.out.is_some() {
            output.success(&format!("Rendered {} documents", documents.len()));
        }
        Ok(())
    }
}

/// Resolution request for markdown documents.
///
/// Without configured include globs only `*.md` and `*.markdown` files are
/// picked up. File roots bypass filtering as usual.
fn document_request(sources: &SourcesConfig) -> ResolutionRequest {
    let mut request = request(sources);
    request
        .include_patterns
        .get_or_insert_with(|| Vec::from(DOCUMENT_INCLUDES.map(str::to_owned)));
    request
}

/// Directory a rewritten document is read from: its place under `out`, or
/// the directory of the source document when printing.
fn document_base(out: Option<&Path>, document: &SourceFile) -> PathBuf {
    let target = match out {
        Some(out) => output_path(out, &document.relative_path),
        None => document.absolute_path.clone(),
    };
    target
        .parent()
        .map_or_else(|| target.clone(), Path::to_path_buf)
}

/// Instantiate the configured renderer.
fn build_renderer(
    diagrams: &DiagramsConfig,
    kind: DiagramKind,
    format: DiagramFormat,
) -> Arc<dyn Renderer> {
    match &diagrams.renderer {
        RendererConfig::Kroki { url } => Arc::new(
            KrokiRenderer::new(url.clone(), kind, format)
                .timeout(diagrams.timeout)
                .options(diagrams.options.clone()),
        ),
        RendererConfig::Command { program, args } => Arc::new(
            CommandRenderer::new(program.clone(), args.clone()).timeout(diagrams.timeout),
        ),
    }
}

/// Location of a rewritten document under `out`.
///
/// Relative paths that stay beneath the working directory keep their layout;
/// anything else is flattened to its file name.
fn output_path(out: &Path, document: &Path) -> PathBuf {
    let nested = document.is_relative()
        && document
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if nested {
        out.join(document)
    } else {
        out.join(document.file_name().unwrap_or(document.as_os_str()))
    }
}

async fn write_document(path: &Path, content: &str) -> Result<(), CliError> {
    let file_error = |source| CliError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(file_error)?;
    }
    tokio::fs::write(path, content).await.map_err(file_error)
}
