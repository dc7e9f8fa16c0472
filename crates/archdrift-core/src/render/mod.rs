//! Diagram rendering.
//!
//! The graph is projected into typed views (see [`projection`]) which are
//! handed to a [`RenderBackend`]. Projections render concurrently and a
//! failing one never aborts the rest.

mod backend;
mod dot;
pub mod projection;

pub use backend::{media_type_for, DotSourceBackend, GraphvizBackend, RenderBackend, RenderedBytes};
pub use projection::{project, Projection};

use crate::config::Config;
use crate::graph::CodeGraph;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to start renderer '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer failed: {0}")]
    Backend(String),

    #[error("Rendering timed out after {0}s")]
    Timeout(u64),

    #[error("Unknown render backend '{0}'")]
    UnknownBackend(String),
}

impl RenderError {
    pub fn backend(reason: impl Into<String>) -> Self {
        RenderError::Backend(reason.into())
    }
}

/// The diagram families produced for every version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    ClassGlobal,
    ClassModule,
    Dependency,
    Call,
    Api,
}

impl DiagramType {
    pub const ALL: [DiagramType; 5] = [
        DiagramType::ClassGlobal,
        DiagramType::ClassModule,
        DiagramType::Dependency,
        DiagramType::Call,
        DiagramType::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramType::ClassGlobal => "class_global",
            DiagramType::ClassModule => "class_module",
            DiagramType::Dependency => "dependency",
            DiagramType::Call => "call",
            DiagramType::Api => "api",
        }
    }

    /// Human-readable title; per-module diagrams append the module name.
    pub fn description(&self) -> &'static str {
        match self {
            DiagramType::ClassGlobal => "Global Class Diagram",
            DiagramType::ClassModule => "Class Diagram",
            DiagramType::Dependency => "Dependency Diagram",
            DiagramType::Call => "Call Diagram",
            DiagramType::Api => "API Diagram",
        }
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiagramType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiagramType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown diagram type '{s}'"))
    }
}

/// A successfully rendered projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub diagram_type: DiagramType,
    pub subject: Option<String>,
    pub description: String,
    pub output: RenderedBytes,
}

/// A projection that could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFailure {
    pub diagram_type: DiagramType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub reason: String,
}

/// Everything produced by one rendering pass.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    pub images: Vec<RenderedImage>,
    pub failures: Vec<RenderFailure>,
}

impl RenderOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Projects graphs and drives a backend.
#[derive(Clone)]
pub struct Renderer {
    backend: Arc<dyn RenderBackend>,
    timeout: Duration,
    diagram_types: Vec<DiagramType>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .field("diagram_types", &self.diagram_types)
            .finish()
    }
}

impl Renderer {
    pub fn new(backend: Arc<dyn RenderBackend>, timeout: Duration, diagram_types: Vec<DiagramType>) -> Self {
        Self {
            backend,
            timeout,
            diagram_types,
        }
    }

    /// Build the renderer selected by `[render]`.
    pub fn from_config(config: &Config) -> Result<Self, RenderError> {
        let render = &config.render;
        let backend: Arc<dyn RenderBackend> = match render.backend.as_str() {
            "graphviz" => Arc::new(GraphvizBackend::new(render.dot_binary.clone(), render.format.clone())),
            "dot-source" => Arc::new(DotSourceBackend),
            other => return Err(RenderError::UnknownBackend(other.to_string())),
        };
        Ok(Self::new(backend, render.timeout(), render.diagram_types.clone()))
    }

    pub fn diagram_types(&self) -> &[DiagramType] {
        &self.diagram_types
    }

    async fn render_projection(&self, projection: Projection) -> Result<RenderedImage, RenderFailure> {
        let attempt = tokio::time::timeout(self.timeout, self.backend.render(&projection)).await;
        let result = match attempt {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.timeout.as_secs())),
        };
        match result {
            Ok(output) => Ok(RenderedImage {
                diagram_type: projection.diagram_type,
                subject: projection.subject,
                description: projection.description,
                output,
            }),
            Err(e) => Err(RenderFailure {
                diagram_type: projection.diagram_type,
                subject: projection.subject,
                reason: e.to_string(),
            }),
        }
    }

    /// Render every projection of one diagram type, failing on the first error.
    pub async fn render(&self, graph: &CodeGraph, diagram_type: DiagramType) -> Result<Vec<RenderedImage>, RenderError> {
        let attempts = join_all(
            project(graph, diagram_type)
                .into_iter()
                .map(|p| self.render_projection(p)),
        )
        .await;
        attempts
            .into_iter()
            .map(|r| r.map_err(|f| RenderError::Backend(f.reason)))
            .collect()
    }

    /// Render all configured diagram types concurrently, collecting failures.
    pub async fn render_all(&self, graph: &CodeGraph) -> RenderOutcome {
        let projections: Vec<Projection> = self
            .diagram_types
            .iter()
            .flat_map(|&t| project(graph, t))
            .collect();
        let total = projections.len();

        let results = join_all(projections.into_iter().map(|p| self.render_projection(p))).await;

        let mut outcome = RenderOutcome::default();
        for result in results {
            match result {
                Ok(image) => outcome.images.push(image),
                Err(failure) => {
                    warn!(
                        diagram = %failure.diagram_type,
                        subject = failure.subject.as_deref().unwrap_or(""),
                        reason = %failure.reason,
                        "Diagram failed to render"
                    );
                    outcome.failures.push(failure);
                }
            }
        }
        info!(
            backend = self.backend.name(),
            rendered = outcome.images.len(),
            failed = outcome.failures.len(),
            total,
            "Rendering finished"
        );
        outcome
    }
}
