//! Diagram block processing for generated documents.
//!
//! [`DiagramProcessor`] finds fenced code blocks of the gateway's diagram kind,
//! renders them concurrently through the [`RenderGateway`], and substitutes each
//! block with a markdown image that references the stored asset. Blocks that fail
//! in non-strict mode stay in the document as written.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use futures::future::join_all;
use regex::Regex;

use crate::cache::normalize_source;
use crate::gateway::{GatewayError, RenderGateway, RenderOutput, relative_reference};
use crate::language::DiagramKind;

/// Fenced code block: opening fence with info string, body, closing fence.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^```[ \t]*([A-Za-z0-9_-]+)[^\n]*\n(.*?)^```[ \t]*\r?$")
        .expect("fence regex is valid")
});

/// A diagram block located in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiagramBlock {
    /// Byte range of the whole fenced block.
    start: usize,
    end: usize,
    /// Normalized body.
    source: String,
}

/// Locate fenced blocks whose info string names `kind`.
fn find_blocks(text: &str, kind: DiagramKind) -> Vec<DiagramBlock> {
    FENCE_RE
        .captures_iter(text)
        .filter(|caps| DiagramKind::parse(&caps[1]) == Some(kind))
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(DiagramBlock {
                start: whole.start(),
                end: whole.end(),
                source: normalize_source(&caps[2]),
            })
        })
        .collect()
}

/// Replaces diagram blocks in documents with references to rendered assets.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use docsmith_diagrams::{DiagramProcessor, RenderGateway};
///
/// let processor = DiagramProcessor::new(Arc::new(gateway)).strict(false);
/// let markdown = processor.process("```mermaid\ngraph TD; A-->B\n```\n").await?;
/// assert!(markdown.starts_with("![diagram]("));
/// ```
pub struct DiagramProcessor {
    gateway: Arc<RenderGateway>,
    strict: bool,
}

impl DiagramProcessor {
    /// Create a non-strict processor.
    #[must_use]
    pub fn new(gateway: Arc<RenderGateway>) -> Self {
        Self {
            gateway,
            strict: false,
        }
    }

    /// Fail the document on the first render failure instead of keeping the block.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Render every diagram block in `text` and return the rewritten document.
    ///
    /// # Errors
    ///
    /// In strict mode, returns the first [`GatewayError`] in document order.
    pub async fn process(&self, text: &str) -> Result<String, GatewayError> {
        self.rewrite(text, None).await
    }

    /// Like [`process`](Self::process), with references relative to the
    /// directory `base` the document will be read from.
    ///
    /// # Errors
    ///
    /// In strict mode, returns the first [`GatewayError`] in document order.
    pub async fn process_in(&self, text: &str, base: &Path) -> Result<String, GatewayError> {
        self.rewrite(text, Some(base)).await
    }

    async fn rewrite(&self, text: &str, base: Option<&Path>) -> Result<String, GatewayError> {
        let blocks = find_blocks(text, self.gateway.kind());
        if blocks.is_empty() {
            return Ok(text.to_owned());
        }

        let outputs = join_all(
            blocks
                .iter()
                .map(|block| self.gateway.ensure_rendered(&block.source, self.strict)),
        )
        .await;

        let mut result = String::with_capacity(text.len());
        let mut cursor = 0;
        for (block, output) in blocks.iter().zip(outputs) {
            result.push_str(&text[cursor..block.start]);
            match output? {
                RenderOutput::Asset { reference, path, .. } => {
                    let reference =
                        base.map_or(reference, |base| relative_reference(&path, base));
                    result.push_str(&format!("![diagram]({reference})"));
                }
                RenderOutput::Source(_) => result.push_str(&text[block.start..block.end]),
            }
            cursor = block.end;
        }
        result.push_str(&text[cursor..]);
        Ok(result)
    }

    /// Process several documents concurrently.
    ///
    /// Each document succeeds or fails on its own; a strict failure in one
    /// document does not affect the others.
    pub async fn process_batch<S: AsRef<str>>(
        &self,
        documents: &[S],
    ) -> Vec<Result<String, GatewayError>> {
        join_all(documents.iter().map(|doc| self.process(doc.as_ref()))).await
    }

    /// Process several documents concurrently, each paired with the directory
    /// its references are relative to.
    pub async fn process_batch_in<S: AsRef<str>, P: AsRef<Path>>(
        &self,
        documents: &[(S, P)],
    ) -> Vec<Result<String, GatewayError>> {
        join_all(
            documents
                .iter()
                .map(|(doc, base)| self.process_in(doc.as_ref(), base.as_ref())),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::DiagramFormat;
    use crate::renderer::{RenderError, RenderRequest, Renderer};
    use async_trait::async_trait;
    use docsmith_cache::CacheLayout;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct EchoRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for EchoRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.source.starts_with("bad") {
                return Err(RenderError::Malformed("unexpected token".to_owned()));
            }
            Ok(request.source.clone().into_bytes())
        }

        fn fingerprint(&self) -> String {
            "echo".to_owned()
        }
    }

    fn processor(tmp: &TempDir, renderer: Arc<EchoRenderer>) -> DiagramProcessor {
        let layout = CacheLayout::new(tmp.path().join("tmp"));
        let gateway = RenderGateway::new(renderer, &layout, DiagramKind::Mermaid, DiagramFormat::Svg)
            .reference_base(tmp.path());
        DiagramProcessor::new(Arc::new(gateway))
    }

    #[test]
    fn test_find_blocks_filters_by_kind() {
        let text = "intro\n```mermaid\ngraph TD;\n  A-->B\n```\n```rust\nfn main() {}\n```\n```kroki-mermaid {theme=dark}\nflowchart LR\n```\n";

        let blocks = find_blocks(text, DiagramKind::Mermaid);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].source, "graph TD;\n  A-->B");
        assert_eq!(&text[blocks[0].start..blocks[0].end], "```mermaid\ngraph TD;\n  A-->B\n```");
        assert_eq!(blocks[1].source, "flowchart LR");
    }

    #[test]
    fn test_find_blocks_none() {
        assert!(find_blocks("no fences here", DiagramKind::Mermaid).is_empty());
        assert!(find_blocks("```dot\ndigraph {}\n```", DiagramKind::Mermaid).is_empty());
    }

    #[tokio::test]
    async fn test_process_replaces_blocks_with_references() {
        let tmp = TempDir::new().unwrap();
        let renderer = Arc::new(EchoRenderer::default());
        let processor = processor(&tmp, Arc::clone(&renderer));

        let text = "# Title\n\n```mermaid\ngraph TD; A-->B\n```\n\nafter\n";
        let output = processor.process(text).await.unwrap();

        let key = processor.gateway.key_for("graph TD; A-->B");
        assert_eq!(
            output,
            format!("# Title\n\n![diagram](tmp/assets/mermaid/{key}.svg)\n\nafter\n")
        );
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_process_in_references_from_document_dir() {
        let tmp = TempDir::new().unwrap();
        let processor = processor(&tmp, Arc::new(EchoRenderer::default()));
        let text = "```mermaid\ngraph TD; A-->B\n```\n";
        let key = processor.gateway.key_for("graph TD; A-->B");

        let nested = processor
            .process_in(text, &tmp.path().join("out/docs"))
            .await
            .unwrap();
        let top = processor.process_in(text, &tmp.path().join("tmp")).await.unwrap();

        assert_eq!(
            nested,
            format!("![diagram](../../tmp/assets/mermaid/{key}.svg)\n")
        );
        assert_eq!(top, format!("![diagram](assets/mermaid/{key}.svg)\n"));
    }

    #[tokio::test]
    async fn test_process_identical_blocks_render_once() {
        let tmp = TempDir::new().unwrap();
        let renderer = Arc::new(EchoRenderer::default());
        let processor = processor(&tmp, Arc::clone(&renderer));

        let text = "```mermaid\ngraph TD; A-->B\n```\n\n```mermaid\r\ngraph TD; A-->B   \r\n```\n";
        let output = processor.process(text).await.unwrap();

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.matches("![diagram](").count(), 2);
    }

    #[tokio::test]
    async fn test_process_non_strict_keeps_failed_block() {
        let tmp = TempDir::new().unwrap();
        let processor = processor(&tmp, Arc::new(EchoRenderer::default()));

        let text = "```mermaid\nbad diagram\n```\n```mermaid\ngraph TD; A-->B\n```\n";
        let output = processor.process(text).await.unwrap();

        assert!(output.starts_with("```mermaid\nbad diagram\n```\n![diagram]("));
    }

    #[tokio::test]
    async fn test_process_strict_fails_document() {
        let tmp = TempDir::new().unwrap();
        let processor = processor(&tmp, Arc::new(EchoRenderer::default())).strict(true);

        let result = processor.process("```mermaid\nbad diagram\n```\n").await;

        assert!(matches!(result, Err(GatewayError::Render { .. })));
    }

    #[tokio::test]
    async fn test_process_batch_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let processor = processor(&tmp, Arc::new(EchoRenderer::default())).strict(true);

        let documents = [
            "```mermaid\nbad diagram\n```\n",
            "```mermaid\ngraph TD; A-->B\n```\n",
            "plain text",
        ];
        let results = processor.process_batch(&documents).await;

        assert!(results[0].is_err());
        assert!(results[1].as_ref().unwrap().starts_with("![diagram]("));
        assert_eq!(results[2].as_ref().unwrap(), "plain text");
    }

    #[tokio::test]
    async fn test_process_batch_in_uses_each_base() {
        let tmp = TempDir::new().unwrap();
        let processor = processor(&tmp, Arc::new(EchoRenderer::default()));
        let text = "```mermaid\ngraph TD; A-->B\n```";
        let key = processor.gateway.key_for("graph TD; A-->B");

        let results = processor
            .process_batch_in(&[(text, tmp.path().join("a")), (text, tmp.path().join("a/b"))])
            .await;

        assert_eq!(
            results[0].as_ref().unwrap(),
            &format!("![diagram](../tmp/assets/mermaid/{key}.svg)")
        );
        assert_eq!(
            results[1].as_ref().unwrap(),
            &format!("![diagram](../../tmp/assets/mermaid/{key}.svg)")
        );
    }
}
