//! Internal constants for diagram rendering.

use std::time::Duration;

/// Maximum number of renders in flight per gateway.
///
/// Kept below the renderer's own worker count so a batch of documents cannot
/// saturate it.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default timeout for a single render (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
