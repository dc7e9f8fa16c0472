//! One analysis run: snapshot, extract, render and evaluate, persist.

mod error;

pub use error::AnalysisError;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::drift::{self, Baseline, Violation};
use crate::extract::Extractor;
use crate::graph::CodeGraph;
use crate::ontology::CompiledOntology;
use crate::render::{RenderError, RenderOutcome, RenderedImage, Renderer};
use crate::snapshot::{GitSnapshotProvider, SnapshotProvider};
use crate::storage::{ImageData, VersionSelector, VersionStore};
use crate::summary::{summarize, SummaryText};
use crate::version::{Completeness, DiagramImage, DiagramVersion, DriftStatus, Project, TriggerSource};

/// What to analyse.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub commit_ref: String,
    pub trigger: TriggerSource,
    /// Re-analyse even if the commit already has a version.
    pub force: bool,
    /// Overrides for the commit metadata read from the snapshot.
    pub message: Option<String>,
    pub author: Option<String>,
    pub branch: Option<String>,
}

impl AnalysisRequest {
    pub fn new(commit_ref: impl Into<String>, trigger: TriggerSource) -> Self {
        Self {
            commit_ref: commit_ref.into(),
            trigger,
            force: false,
            message: None,
            author: None,
            branch: None,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Persisted(DiagramVersion),
    /// The resolved commit already had a live version.
    Duplicate { version_id: String, commit_hash: String },
}

/// The analysis stages wired to their collaborators.
#[derive(Clone)]
pub struct Pipeline {
    snapshots: Arc<dyn SnapshotProvider>,
    extractor: Arc<Extractor>,
    renderer: Renderer,
    store: Arc<dyn VersionStore>,
}

impl Pipeline {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        extractor: Arc<Extractor>,
        renderer: Renderer,
        store: Arc<dyn VersionStore>,
    ) -> Self {
        Self {
            snapshots,
            extractor,
            renderer,
            store,
        }
    }

    /// Pipeline using git snapshots and the configured renderer.
    pub fn from_config(config: &Config, store: Arc<dyn VersionStore>) -> Result<Self, RenderError> {
        Ok(Self::new(
            Arc::new(GitSnapshotProvider::from_config(config)),
            Arc::new(Extractor::new(config.extraction.clone())),
            Renderer::from_config(config)?,
            store,
        ))
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotProvider> {
        &self.snapshots
    }

    /// Run one analysis. `ontology` is the snapshot of rules taken when the
    /// run started; `None` records drift as unevaluated.
    pub async fn run(
        &self,
        project: &Project,
        request: &AnalysisRequest,
        ontology: Option<Arc<CompiledOntology>>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let span = info_span!("analysis", project_id = %project.id, commit = %request.commit_ref);
        self.run_inner(project, request, ontology).instrument(span).await
    }

    async fn run_inner(
        &self,
        project: &Project,
        request: &AnalysisRequest,
        ontology: Option<Arc<CompiledOntology>>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let snapshot = self.snapshots.snapshot(&project.repo_url, &request.commit_ref).await?;
        let commit = snapshot.commit().clone();
        debug!(hash = %commit.hash, "Snapshot resolved");

        let previous_live = self.store.find_current(&project.id, &commit.hash)?;
        if let (Some(existing), false) = (&previous_live, request.force) {
            info!(hash = %commit.hash, "Commit already analysed");
            return Ok(AnalysisOutcome::Duplicate {
                version_id: existing.id.clone(),
                commit_hash: commit.hash,
            });
        }

        let graph = Arc::new(
            self.extractor
                .clone()
                .extract_async(snapshot.root().to_path_buf())
                .await?,
        );
        drop(snapshot);

        let previous = match self.store.find_version(&project.id, &VersionSelector::Latest) {
            Ok(version) => Some(version),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let (rendered, (violations, drift_status, text)) = tokio::join!(
            self.renderer.render_all(&graph),
            evaluate(graph.clone(), ontology, previous)
        );

        let RenderOutcome {
            images: rendered_images,
            failures: render_failures,
        } = rendered;
        let version_id = Uuid::new_v4().to_string();
        let (images, image_data) = stage_images(&version_id, rendered_images);
        let version = DiagramVersion {
            id: version_id,
            project_id: project.id.clone(),
            sequence: 0,
            commit_hash: commit.hash.clone(),
            commit_message: non_empty(&request.message).unwrap_or(commit.message),
            author: non_empty(&request.author).unwrap_or(commit.author),
            branch: request.branch.clone().filter(|b| !b.is_empty()),
            trigger_source: request.trigger,
            created_at: Utc::now(),
            readme_content: text.readme,
            summary_content: text.summary,
            images,
            violations,
            superseded: false,
            graph_stats: graph.stats(),
            graph_digest: graph.digest(),
            endpoints: graph.endpoints(),
            completeness: Completeness {
                parse_failures: graph.report().failures.clone(),
                render_failures,
                drift: drift_status,
            },
        };

        let supersedes = previous_live.as_ref().map(|v| v.id.as_str());
        let version = self.store.persist_version(version, image_data, supersedes)?;
        info!(
            version = %version.id,
            hash = %version.commit_hash,
            images = version.images.len(),
            violations = version.violations.len(),
            complete = version.completeness.is_complete(),
            "Version persisted"
        );
        Ok(AnalysisOutcome::Persisted(version))
    }
}

/// Drift detection, against the ontology and the previous version, followed
/// by the summary that depends on it.
async fn evaluate(
    graph: Arc<CodeGraph>,
    ontology: Option<Arc<CompiledOntology>>,
    previous: Option<DiagramVersion>,
) -> (Vec<Violation>, DriftStatus, SummaryText) {
    let (violations, status) = match ontology {
        Some(ontology) => {
            let graph = graph.clone();
            let previous = previous.clone();
            let evaluation = tokio::task::spawn_blocking(move || {
                let baseline = previous.as_ref().map(Baseline::of);
                drift::evaluate(&graph, &ontology, baseline.as_ref())
            });
            match evaluation.await {
                Ok(violations) => (violations, DriftStatus::Evaluated),
                Err(e) => (
                    Vec::new(),
                    DriftStatus::Unevaluated {
                        reason: format!("drift detection failed: {e}"),
                    },
                ),
            }
        }
        None => (
            Vec::new(),
            DriftStatus::Unevaluated {
                reason: "no ontology configured".to_string(),
            },
        ),
    };
    let text = summarize(&graph, previous.as_ref(), &violations, &status);
    (violations, status, text)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Assign image ids and store references for rendered diagrams.
fn stage_images(version_id: &str, rendered: Vec<RenderedImage>) -> (Vec<DiagramImage>, Vec<ImageData>) {
    rendered
        .into_iter()
        .map(|image| {
            let id = Uuid::new_v4().to_string();
            let image_ref = format!("{version_id}/{id}.{}", image.output.extension);
            let record = DiagramImage {
                id,
                diagram_type: image.diagram_type,
                subject: image.subject,
                description: image.description,
                image_ref: image_ref.clone(),
                media_type: image.output.media_type,
            };
            (record, ImageData { image_ref, bytes: image.output.bytes })
        })
        .unzip()
}
