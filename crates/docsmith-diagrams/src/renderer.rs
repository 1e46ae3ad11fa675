//! Renderer collaborator interface.
//!
//! A [`Renderer`] turns diagram text into asset bytes. Implementations must be
//! stateless from the caller's point of view: concurrent calls may not observe
//! each other, and dropping a call's future aborts only that render.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// A single render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Normalized diagram source.
    pub source: String,
    /// Whether the caller treats failure as fatal.
    pub strict: bool,
}

/// Renderer failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The diagram source was rejected by the renderer.
    #[error("malformed diagram: {0}")]
    Malformed(String),
    /// The renderer could not be reached or answered unexpectedly.
    #[error("renderer unavailable: {0}")]
    Transport(String),
    /// Local I/O failed while talking to the renderer.
    #[error("I/O error: {0}")]
    Io(String),
    /// The render did not finish in time.
    #[error("render timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// External diagram renderer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the request's source into asset bytes.
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError>;

    /// Stable description of every setting that affects the rendered bytes.
    ///
    /// Folded into cache keys so that changing renderer configuration never
    /// serves assets produced under the old configuration.
    fn fingerprint(&self) -> String;
}
