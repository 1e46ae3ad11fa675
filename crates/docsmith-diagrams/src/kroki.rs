//! Kroki HTTP renderer.
//!
//! Diagrams are POSTed as plain text to `{server_url}/{kind}/{format}`; the
//! response body is the rendered asset. Requests share one pooled [`Agent`] and
//! run on the blocking thread pool.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ureq::Agent;

use crate::consts::DEFAULT_TIMEOUT;
use crate::language::{DiagramFormat, DiagramKind};
use crate::renderer::{RenderError, RenderRequest, Renderer};

/// Create HTTP agent with the specified timeout.
///
/// HTTP error statuses are returned as responses so their bodies can be read.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Renders diagrams through a Kroki server.
#[derive(Clone)]
pub struct KrokiRenderer {
    agent: Agent,
    server_url: String,
    kind: DiagramKind,
    format: DiagramFormat,
    options: BTreeMap<String, String>,
    timeout: Duration,
}

impl KrokiRenderer {
    /// Create a renderer for `kind` diagrams with the default timeout.
    ///
    /// A trailing `/` on `server_url` is ignored.
    #[must_use]
    pub fn new(server_url: impl Into<String>, kind: DiagramKind, format: DiagramFormat) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_owned();
        Self {
            agent: create_agent(DEFAULT_TIMEOUT),
            server_url,
            kind,
            format,
            options: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.agent = create_agent(timeout);
        self.timeout = timeout;
        self
    }

    /// Diagram options sent as query parameters (e.g., `theme=dark`).
    #[must_use]
    pub fn options(mut self, options: BTreeMap<String, String>) -> Self {
        self.options = options;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.server_url,
            self.kind.as_str(),
            self.format.as_str()
        )
    }

    /// Send one diagram and return the response body.
    fn send(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        let request = self
            .options
            .iter()
            .fold(self.agent.post(&self.url()), |request, (key, value)| {
                request.query(key, value)
            });

        let response = request
            .header("Content-Type", "text/plain")
            .send(source.as_bytes())
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => RenderError::Timeout(self.timeout),
                other => RenderError::Transport(other.to_string()),
            })?;

        let status = response.status().as_u16();
        let mut body = response.into_body();

        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            let message = format!("HTTP {status}: {}", error_body.trim());
            return Err(if status < 500 {
                RenderError::Malformed(message)
            } else {
                RenderError::Transport(message)
            });
        }

        body.read_to_vec()
            .map_err(|e| RenderError::Io(e.to_string()))
    }
}

#[async_trait]
impl Renderer for KrokiRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        let renderer = self.clone();
        let source = request.source.clone();
        tokio::task::spawn_blocking(move || renderer.send(&source))
            .await
            .map_err(|e| RenderError::Io(e.to_string()))?
    }

    fn fingerprint(&self) -> String {
        format!("kroki:{:?}", (&self.server_url, &self.options))
    }
}
