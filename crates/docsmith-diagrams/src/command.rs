//! Local command renderer.
//!
//! Each render spawns a fresh process, writes the diagram source to its stdin and
//! reads the asset from its stdout (e.g., `mmdc -i - -o - -e svg`). The child is
//! killed if the render times out or its future is dropped.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::consts::DEFAULT_TIMEOUT;
use crate::renderer::{RenderError, RenderRequest, Renderer};

/// Renders diagrams by piping them through an external program.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    /// Create a renderer that runs `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-render timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Io(format!("failed to spawn {}: {e}", self.program)))?;

        // Feed stdin concurrently so a child that writes before reading cannot deadlock.
        let stdin = child.stdin.take();
        let input = source.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RenderError::Io(e.to_string()))?;

        if let Ok(Err(e)) = writer.await {
            tracing::debug!(program = %self.program, error = %e, "Renderer closed stdin early");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(RenderError::Malformed(if detail.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                detail.to_owned()
            }));
        }
        if output.stdout.is_empty() {
            return Err(RenderError::Malformed(format!(
                "{} produced no output",
                self.program
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        tokio::time::timeout(self.timeout, self.run(&request.source))
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))?
    }

    /// Quoted argv, so argument boundaries are part of the key.
    fn fingerprint(&self) -> String {
        let argv: Vec<&str> = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect();
        format!("command:{argv:?}")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(source: &str) -> RenderRequest {
        RenderRequest {
            source: source.to_owned(),
            strict: false,
        }
    }

    fn sh(script: &str) -> CommandRenderer {
        CommandRenderer::new("sh", vec!["-c".to_owned(), script.to_owned()])
    }

    #[tokio::test]
    async fn test_render_pipes_source_through_program() {
        let renderer = CommandRenderer::new("cat", Vec::new());

        let bytes = renderer.render(&request("graph TD; A-->B")).await.unwrap();

        assert_eq!(bytes, b"graph TD; A-->B");
    }

    #[tokio::test]
    async fn test_render_nonzero_exit_is_malformed_with_stderr() {
        let renderer = sh("cat >/dev/null; echo 'Parse error on line 1' >&2; exit 1");

        let err = renderer.render(&request("graph TD; A--")).await.unwrap_err();

        assert_eq!(err, RenderError::Malformed("Parse error on line 1".to_owned()));
    }

    #[tokio::test]
    async fn test_render_empty_output_is_malformed() {
        let renderer = sh("cat >/dev/null");

        let err = renderer.render(&request("graph TD; A-->B")).await.unwrap_err();

        assert!(matches!(err, RenderError::Malformed(msg) if msg.contains("no output")));
    }

    #[tokio::test]
    async fn test_render_missing_program_is_io() {
        let renderer = CommandRenderer::new("docsmith-no-such-renderer", Vec::new());

        let err = renderer.render(&request("graph TD; A-->B")).await.unwrap_err();

        assert!(matches!(err, RenderError::Io(_)));
    }

    #[tokio::test]
    async fn test_render_times_out() {
        let renderer = sh("sleep 5").timeout(Duration::from_millis(100));

        let err = renderer.render(&request("graph TD; A-->B")).await.unwrap_err();

        assert_eq!(err, RenderError::Timeout(Duration::from_millis(100)));
    }

    #[test]
    fn test_fingerprint_includes_args() {
        let renderer = CommandRenderer::new("mmdc", vec!["-t".to_owned(), "dark".to_owned()]);
        assert_eq!(renderer.fingerprint(), r#"command:["mmdc", "-t", "dark"]"#);
        assert_ne!(
            renderer.fingerprint(),
            CommandRenderer::new("mmdc", Vec::new()).fingerprint()
        );
    }

    #[test]
    fn test_fingerprint_keeps_argument_boundaries() {
        let joined = CommandRenderer::new("mmdc", vec!["-t dark".to_owned()]);
        let split = CommandRenderer::new("mmdc", vec!["-t".to_owned(), "dark".to_owned()]);
        assert_ne!(joined.fingerprint(), split.fingerprint());
    }
}
