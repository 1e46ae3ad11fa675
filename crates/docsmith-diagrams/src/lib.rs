//! Cached diagram rendering for generated documents.
//!
//! This crate turns diagram source into stored assets and rewrites documents to
//! reference them:
//! - [`RenderGateway`] derives a content key, serves cache hits, and renders misses
//!   under a concurrency cap, coalescing identical concurrent requests
//! - [`DiagramProcessor`] finds fenced diagram blocks and substitutes references
//! - [`KrokiRenderer`] and [`CommandRenderer`] implement the [`Renderer`] interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docsmith_cache::CacheLayout;
//! use docsmith_diagrams::{DiagramFormat, DiagramKind, KrokiRenderer, RenderGateway};
//!
//! let layout = CacheLayout::new(".docsmith/tmp");
//! layout.ensure().await?;
//! let renderer = KrokiRenderer::new("https://kroki.io", DiagramKind::Mermaid, DiagramFormat::Svg);
//! let gateway = RenderGateway::new(Arc::new(renderer), &layout, DiagramKind::Mermaid, DiagramFormat::Svg);
//!
//! let output = gateway.ensure_rendered("graph TD; A-->B", false).await?;
//! println!("{}", output.as_str());
//! ```

mod cache;
mod command;
mod consts;
mod gateway;
mod kroki;
mod language;
mod processor;
mod renderer;

pub use cache::{DiagramKey, normalize_source};
pub use command::CommandRenderer;
pub use consts::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
pub use gateway::{GatewayError, RenderGateway, RenderOutput};
pub use kroki::KrokiRenderer;
pub use language::{DiagramFormat, DiagramKind};
pub use processor::DiagramProcessor;
pub use renderer::{RenderError, RenderRequest, Renderer};
