//! Rendering backends.

use super::{Projection, RenderError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Output of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBytes {
    pub bytes: Vec<u8>,
    pub media_type: String,
    /// File extension used when the bytes are stored.
    pub extension: String,
}

/// Turns a projection into image bytes.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, projection: &Projection) -> Result<RenderedBytes, RenderError>;

    fn name(&self) -> &str;
}

/// Media type for a Graphviz output format.
pub fn media_type_for(format: &str) -> &'static str {
    match format {
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "dot" | "gv" | "canon" => "text/vnd.graphviz",
        _ => "application/octet-stream",
    }
}

/// Pipes DOT through the Graphviz `dot` executable.
#[derive(Debug, Clone)]
pub struct GraphvizBackend {
    binary: String,
    format: String,
}

impl GraphvizBackend {
    pub fn new(binary: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
        }
    }
}

#[async_trait]
impl RenderBackend for GraphvizBackend {
    async fn render(&self, projection: &Projection) -> Result<RenderedBytes, RenderError> {
        let mut child = Command::new(&self.binary)
            .arg(format!("-T{}", self.format))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Spawn {
                binary: self.binary.clone(),
                source: e,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(projection.dot.as_bytes())
                .await
                .map_err(|e| RenderError::backend(format!("writing DOT to {}: {e}", self.binary)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RenderError::backend(format!("{} failed: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(RenderError::backend(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            diagram = %projection.diagram_type,
            bytes = output.stdout.len(),
            "Rendered with graphviz"
        );
        Ok(RenderedBytes {
            bytes: output.stdout,
            media_type: media_type_for(&self.format).to_string(),
            extension: self.format.clone(),
        })
    }

    fn name(&self) -> &str {
        "graphviz"
    }
}

/// Returns the DOT text unchanged, for hosts without Graphviz.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotSourceBackend;

#[async_trait]
impl RenderBackend for DotSourceBackend {
    async fn render(&self, projection: &Projection) -> Result<RenderedBytes, RenderError> {
        Ok(RenderedBytes {
            bytes: projection.dot.clone().into_bytes(),
            media_type: media_type_for("dot").to_string(),
            extension: "dot".to_string(),
        })
    }

    fn name(&self) -> &str {
        "dot-source"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::DiagramType;

    fn projection() -> Projection {
        Projection {
            diagram_type: DiagramType::Dependency,
            subject: None,
            description: "Dependency Diagram".to_string(),
            dot: "digraph G {}\n".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dot_source_returns_text() {
        let out = DotSourceBackend.render(&projection()).await.unwrap();
        assert_eq!(out.bytes, b"digraph G {}\n");
        assert_eq!(out.media_type, "text/vnd.graphviz");
        assert_eq!(out.extension, "dot");
    }

    #[tokio::test]
    async fn test_missing_graphviz_binary() {
        let backend = GraphvizBackend::new("archdrift-no-such-dot", "png");
        let err = backend.render(&projection()).await.unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }));
    }

    #[test]
    fn test_media_types() {
        assert_eq!(media_type_for("svg"), "image/svg+xml");
        assert_eq!(media_type_for("weird"), "application/octet-stream");
    }
}
