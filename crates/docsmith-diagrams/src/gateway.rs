//! Cached, concurrency-bounded access to a [`Renderer`].
//!
//! [`RenderGateway::ensure_rendered`] runs each request through:
//!
//! 1. Key derivation: [`DiagramKey`] over source, kind, format and the renderer
//!    fingerprint, giving `{cache_dir}/{key}.{ext}`
//! 2. Cache hit: the path exists, return its reference without rendering
//! 3. Miss: render under the concurrency cap and store the bytes write-once
//! 4. Failure: strict requests get an error, others get the source text back
//!
//! Identical concurrent requests are coalesced by the [`AssetCache`], so the
//! renderer sees each key at most once.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use docsmith_cache::{AssetCache, CacheError, CacheLayout, FillError};
use tokio::sync::Semaphore;

use crate::cache::DiagramKey;
use crate::consts::DEFAULT_CONCURRENCY;
use crate::language::{DiagramFormat, DiagramKind};
use crate::renderer::{RenderError, RenderRequest, Renderer};

/// Result of [`RenderGateway::ensure_rendered`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    /// A stored asset.
    Asset {
        /// Reference to embed in the document.
        reference: String,
        /// Path of the stored asset.
        path: PathBuf,
        /// True if no render was needed.
        cached: bool,
    },
    /// Rendering failed in non-strict mode; carries the source text unchanged.
    Source(String),
}

impl RenderOutput {
    /// Text to substitute into the document: the asset reference or the source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Asset { reference, .. } => reference,
            Self::Source(source) => source,
        }
    }
}

/// Strict-mode rendering failure.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The renderer failed.
    #[error("diagram {key}: {source}")]
    Render {
        /// Cache key of the diagram.
        key: String,
        /// Renderer error.
        #[source]
        source: RenderError,
    },
    /// The rendered asset could not be stored.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Render façade combining a [`Renderer`], an [`AssetCache`] and a concurrency cap.
pub struct RenderGateway {
    renderer: Arc<dyn Renderer>,
    cache: AssetCache,
    kind: DiagramKind,
    format: DiagramFormat,
    fingerprint: String,
    permits: Semaphore,
    reference_base: Option<PathBuf>,
}

impl RenderGateway {
    /// Create a gateway storing assets under `layout.asset_dir(kind)`.
    ///
    /// Captures the renderer's fingerprint once; a renderer's configuration is
    /// fixed for the gateway's lifetime.
    #[must_use]
    pub fn new(
        renderer: Arc<dyn Renderer>,
        layout: &CacheLayout,
        kind: DiagramKind,
        format: DiagramFormat,
    ) -> Self {
        let fingerprint = renderer.fingerprint();
        Self {
            renderer,
            cache: AssetCache::new(layout.asset_dir(kind.as_str()), format.as_str()),
            kind,
            format,
            fingerprint,
            permits: Semaphore::new(DEFAULT_CONCURRENCY),
            reference_base: None,
        }
    }

    /// Set the maximum number of renders in flight (minimum 1).
    #[must_use]
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.permits = Semaphore::new(limit.max(1));
        self
    }

    /// Make references relative to `base` (e.g., the output document's directory).
    ///
    /// Without a base, references are the asset paths as stored. Assets outside
    /// `base` are reached through `..` segments.
    #[must_use]
    pub fn reference_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.reference_base = Some(base.into());
        self
    }

    /// Diagram kind handled by this gateway.
    #[must_use]
    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    /// Cache key for a normalized source.
    #[must_use]
    pub fn key_for(&self, normalized_source: &str) -> String {
        DiagramKey {
            source: normalized_source,
            kind: self.kind,
            format: self.format,
            fingerprint: &self.fingerprint,
        }
        .compute_hash()
    }

    /// Return a reference to the rendered asset for `normalized_source`.
    ///
    /// # Errors
    ///
    /// Only in strict mode: [`GatewayError::Render`] when the renderer fails and
    /// [`GatewayError::Cache`] when the asset cannot be stored. In non-strict
    /// mode both degrade to [`RenderOutput::Source`].
    pub async fn ensure_rendered(
        &self,
        normalized_source: &str,
        strict: bool,
    ) -> Result<RenderOutput, GatewayError> {
        let key = self.key_for(normalized_source);
        let request = RenderRequest {
            source: normalized_source.to_owned(),
            strict,
        };

        let filled = self
            .cache
            .get_or_insert_with(&key, || self.render_bounded(&request))
            .await;

        match filled {
            Ok(lookup) => Ok(RenderOutput::Asset {
                reference: self.reference(&lookup.path),
                path: lookup.path,
                cached: lookup.hit,
            }),
            Err(e) if strict => Err(match e {
                FillError::Generate(source) => GatewayError::Render { key, source },
                FillError::Store(e) => GatewayError::Cache(e),
            }),
            Err(e) => {
                tracing::warn!("diagram {key} left as source: {e}");
                Ok(RenderOutput::Source(normalized_source.to_owned()))
            }
        }
    }

    async fn render_bounded(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RenderError::Transport(e.to_string()))?;
        tracing::debug!("rendering {} diagram", self.kind);
        self.renderer.render(request).await
    }

    fn reference(&self, path: &Path) -> String {
        match &self.reference_base {
            Some(base) => relative_reference(path, base),
            None => path.to_string_lossy().replace('\\', "/"),
        }
    }
}

/// Reference to `path` from the directory `base`, with `/` separators.
///
/// Both paths are compared lexically. When they share no prefix, or `base` has
/// `.` or `..` components past the shared prefix, `path` is returned unchanged.
pub(crate) fn relative_reference(path: &Path, base: &Path) -> String {
    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let walkable = base_parts[common..]
        .iter()
        .all(|c| matches!(c, Component::Normal(_)));
    let relative: PathBuf = if common == 0 || !walkable {
        path.to_path_buf()
    } else {
        std::iter::repeat_n(Component::ParentDir, base_parts.len() - common)
            .chain(path_parts[common..].iter().copied())
            .collect()
    };
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::MockRenderer;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Counts calls and tracks the peak number of overlapping renders.
    #[derive(Default)]
    struct SpyRenderer {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl SpyRenderer {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Renderer for SpyRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if request.source.contains("syntax error") {
                return Err(RenderError::Malformed("parse error on line 1".to_owned()));
            }
            Ok(format!("<svg>{}</svg>", request.source).into_bytes())
        }

        fn fingerprint(&self) -> String {
            "spy".to_owned()
        }
    }

    fn gateway(tmp: &TempDir, renderer: Arc<dyn Renderer>) -> RenderGateway {
        let layout = CacheLayout::new(tmp.path().join("tmp"));
        RenderGateway::new(renderer, &layout, DiagramKind::Mermaid, DiagramFormat::Svg)
    }

    #[tokio::test]
    async fn test_second_call_is_cache_hit() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockRenderer::new();
        mock.expect_fingerprint().return_const("mock".to_owned());
        mock.expect_render()
            .times(1)
            .returning(|_| Ok(b"<svg/>".to_vec()));
        let gateway = gateway(&tmp, Arc::new(mock));

        let first = gateway.ensure_rendered("graph TD; A-->B", false).await.unwrap();
        let second = gateway.ensure_rendered("graph TD; A-->B", false).await.unwrap();

        let RenderOutput::Asset { cached, path, .. } = &first else {
            panic!("expected asset, got {first:?}");
        };
        assert!(!cached);
        assert_eq!(std::fs::read(path).unwrap(), b"<svg/>");
        assert!(matches!(second, RenderOutput::Asset { cached: true, .. }));
        assert_eq!(first.as_str(), second.as_str());
    }

    #[tokio::test]
    async fn test_asset_path_layout() {
        let tmp = TempDir::new().unwrap();
        let gateway = gateway(&tmp, Arc::new(SpyRenderer::default()));

        let output = gateway.ensure_rendered("graph LR; X-->Y", false).await.unwrap();

        let key = gateway.key_for("graph LR; X-->Y");
        let expected = tmp.path().join(format!("tmp/assets/mermaid/{key}.svg"));
        assert_eq!(output.as_str(), expected.to_string_lossy().replace('\\', "/"));
    }

    #[tokio::test]
    async fn test_reference_relative_to_base() {
        let tmp = TempDir::new().unwrap();
        let gateway = gateway(&tmp, Arc::new(SpyRenderer::default())).reference_base(tmp.path());

        let output = gateway.ensure_rendered("graph LR; X-->Y", false).await.unwrap();

        let key = gateway.key_for("graph LR; X-->Y");
        assert_eq!(output.as_str(), format!("tmp/assets/mermaid/{key}.svg"));
    }

    #[tokio::test]
    async fn test_reference_climbs_out_of_base() {
        let tmp = TempDir::new().unwrap();
        let gateway = gateway(&tmp, Arc::new(SpyRenderer::default()))
            .reference_base(tmp.path().join("site/guide"));

        let output = gateway.ensure_rendered("graph LR; X-->Y", false).await.unwrap();

        let key = gateway.key_for("graph LR; X-->Y");
        assert_eq!(
            output.as_str(),
            format!("../../tmp/assets/mermaid/{key}.svg")
        );
    }

    #[test]
    fn test_relative_reference() {
        assert_eq!(
            relative_reference(Path::new("/p/cache/a.svg"), Path::new("/p/out/docs")),
            "../../cache/a.svg"
        );
        assert_eq!(
            relative_reference(Path::new("/p/out/assets/a.svg"), Path::new("/p/out")),
            "assets/a.svg"
        );
        assert_eq!(
            relative_reference(Path::new("/p/cache/a.svg"), Path::new("/p/x/../out")),
            "/p/cache/a.svg"
        );
        assert_eq!(
            relative_reference(Path::new("cache/a.svg"), Path::new("/p/out")),
            "cache/a.svg"
        );
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_render_once() {
        let tmp = TempDir::new().unwrap();
        let spy = Arc::new(SpyRenderer::slow(Duration::from_millis(100)));
        let gateway = gateway(&tmp, Arc::clone(&spy) as Arc<dyn Renderer>);

        let (a, b) = tokio::join!(
            gateway.ensure_rendered("sequenceDiagram\nA->>B: hi", false),
            gateway.ensure_rendered("sequenceDiagram\nA->>B: hi", false),
        );

        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().as_str(), b.unwrap().as_str());
        let assets: Vec<_> = std::fs::read_dir(tmp.path().join("tmp/assets/mermaid"))
            .unwrap()
            .collect();
        assert_eq!(assets.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let tmp = TempDir::new().unwrap();
        let spy = Arc::new(SpyRenderer::slow(Duration::from_millis(30)));
        let gateway = gateway(&tmp, Arc::clone(&spy) as Arc<dyn Renderer>).concurrency(2);

        let sources: Vec<String> = (0..8).map(|i| format!("graph TD; N{i}-->M")).collect();
        let results =
            futures::future::join_all(sources.iter().map(|s| gateway.ensure_rendered(s, true)))
                .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 8);
        assert!(spy.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_strict_failure_is_error() {
        let tmp = TempDir::new().unwrap();
        let gateway = gateway(&tmp, Arc::new(SpyRenderer::default()));

        let result = gateway.ensure_rendered("graph TD; syntax error", true).await;

        assert!(matches!(
            result,
            Err(GatewayError::Render {
                source: RenderError::Malformed(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_non_strict_failure_returns_source() {
        let tmp = TempDir::new().unwrap();
        let gateway = gateway(&tmp, Arc::new(SpyRenderer::default()));

        let output = gateway
            .ensure_rendered("graph TD; syntax error", false)
            .await
            .unwrap();

        assert_eq!(output, RenderOutput::Source("graph TD; syntax error".to_owned()));
        assert!(!tmp.path().join("tmp/assets/mermaid").exists());
    }

    #[tokio::test]
    async fn test_failure_is_retried_next_time() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockRenderer::new();
        mock.expect_fingerprint().return_const("mock".to_owned());
        let mut seq = mockall::Sequence::new();
        mock.expect_render()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(RenderError::Transport("connection refused".to_owned())));
        mock.expect_render()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(b"<svg/>".to_vec()));
        let gateway = gateway(&tmp, Arc::new(mock));

        let first = gateway.ensure_rendered("graph TD; A", false).await.unwrap();
        let second = gateway.ensure_rendered("graph TD; A", false).await.unwrap();

        assert!(matches!(first, RenderOutput::Source(_)));
        assert!(matches!(second, RenderOutput::Asset { cached: false, .. }));
    }

    #[tokio::test]
    async fn test_fingerprint_changes_key() {
        let tmp = TempDir::new().unwrap();
        let mut light = MockRenderer::new();
        light.expect_fingerprint().return_const("theme=light".to_owned());
        let mut dark = MockRenderer::new();
        dark.expect_fingerprint().return_const("theme=dark".to_owned());

        let light = gateway(&tmp, Arc::new(light));
        let dark = gateway(&tmp, Arc::new(dark));

        assert_ne!(light.key_for("graph TD; A"), dark.key_for("graph TD; A"));
    }
}
