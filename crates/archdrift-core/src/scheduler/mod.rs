//! Per-project analysis scheduling and the query facade.
//!
//! Each project has a slot that is either idle or running one analysis. A
//! trigger that arrives while a run is in progress takes the single pending
//! position, replacing whatever was waiting there. The mutex around the
//! slots is held only for bookkeeping, never across an await.

mod poller;
mod trigger;

pub use poller::Poller;
pub use trigger::{TriggerPayload, TriggerResponse};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SHORT_HASH_LEN;
use crate::ontology::{CompiledOntology, Ontology, OntologyError, OntologyStore};
use crate::pipeline::{AnalysisError, AnalysisOutcome, AnalysisRequest, Pipeline};
use crate::snapshot::is_option_like;
use crate::storage::{StorageError, VersionSelector, VersionStore};
use crate::version::{DiagramVersion, Project, TriggerSource, VersionSummary};

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Project {0} is being analysed")]
    Busy(String),

    #[error("Project {0} has no failed analysis to retry")]
    NothingToRetry(String),

    #[error("Repository URL '{0}' is not usable")]
    InvalidRepository(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ontology(#[from] OntologyError),
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::Storage(e) if e.is_not_found())
    }
}

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    #[default]
    Idle,
    Analyzing,
    /// A run just failed; the slot returns to idle once the failure is recorded.
    Failed,
}

/// How the most recent run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LastOutcome {
    Persisted { version_id: String, commit_hash: String },
    Duplicate { version_id: String, commit_hash: String },
    Failed { commit_ref: String, kind: String, reason: String },
}

/// Snapshot of a project's scheduling state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub state: ProjectState,
    pub running: Option<String>,
    pub pending: Option<String>,
    pub last_outcome: Option<LastOutcome>,
}

struct Slot {
    state: ProjectState,
    running: Option<AnalysisRequest>,
    pending: Option<AnalysisRequest>,
    last_outcome: Option<LastOutcome>,
    last_failed: Option<AnalysisRequest>,
    idle: watch::Sender<bool>,
}

impl Slot {
    fn new() -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            state: ProjectState::Idle,
            running: None,
            pending: None,
            last_outcome: None,
            last_failed: None,
            idle,
        }
    }
}

struct Inner {
    pipeline: Pipeline,
    ontologies: OntologyStore,
    slots: Mutex<HashMap<String, Slot>>,
}

/// Front door for triggers and queries. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                ontologies: OntologyStore::new(),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn store(&self) -> &Arc<dyn VersionStore> {
        self.inner.pipeline.store()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Projects

    pub fn create_project(&self, name: &str, repo_url: &str) -> Result<Project, SchedulerError> {
        if repo_url.trim().is_empty() || is_option_like(repo_url) {
            return Err(SchedulerError::InvalidRepository(repo_url.to_string()));
        }
        let project = Project::new(name, repo_url);
        self.store().save_project(&project)?;
        info!(project_id = %project.id, name, "Project created");
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Project, SchedulerError> {
        Ok(self.store().load_project(id)?)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, SchedulerError> {
        Ok(self.store().list_projects()?)
    }

    /// Delete a project and everything it owns. Refused while it is analysing.
    pub async fn delete_project(&self, id: &str) -> Result<(), SchedulerError> {
        {
            let mut slots = self.slots();
            if let Some(slot) = slots.get(id) {
                if slot.state != ProjectState::Idle || slot.pending.is_some() {
                    return Err(SchedulerError::Busy(id.to_string()));
                }
            }
            self.store().delete_project(id)?;
            slots.remove(id);
        }
        self.inner.ontologies.remove(id).await;
        info!(project_id = id, "Project deleted");
        Ok(())
    }

    // Ontologies

    /// Validate and install an ontology; returns the number of rules.
    pub async fn set_ontology(&self, project_id: &str, yaml: &str) -> Result<usize, SchedulerError> {
        let compiled = CompiledOntology::compile(Ontology::from_yaml(yaml)?)?;
        let rules = compiled.rules().len();
        self.store().save_ontology(project_id, yaml)?;
        self.inner.ontologies.set(project_id, compiled).await;
        info!(project_id, rules, "Ontology updated");
        Ok(rules)
    }

    /// Current rules of a project, loading them from the store on first use.
    pub async fn ontology(&self, project_id: &str) -> Option<Arc<CompiledOntology>> {
        if let Some(ontology) = self.inner.ontologies.get(project_id).await {
            return Some(ontology);
        }
        let yaml = match self.store().load_ontology(project_id) {
            Ok(Some(yaml)) => yaml,
            Ok(None) => return None,
            Err(e) => {
                warn!(project_id, error = %e, "Could not load ontology");
                return None;
            }
        };
        match CompiledOntology::from_yaml(&yaml) {
            Ok(compiled) => {
                self.inner.ontologies.set(project_id, compiled).await;
                self.inner.ontologies.get(project_id).await
            }
            Err(e) => {
                warn!(project_id, error = %e, "Stored ontology is invalid");
                None
            }
        }
    }

    // Triggers

    /// Convenience wrapper for hook and webhook payloads.
    pub fn trigger(&self, payload: TriggerPayload, source: TriggerSource) -> Result<TriggerResponse, SchedulerError> {
        let project_id = payload.project_id.clone();
        self.request_analysis(&project_id, payload.into_request(source))
    }

    /// Submit an analysis request. Returns immediately.
    pub fn request_analysis(&self, project_id: &str, request: AnalysisRequest) -> Result<TriggerResponse, SchedulerError> {
        self.store().load_project(project_id)?;

        if !request.force && self.already_stored(project_id, &request.commit_ref)? {
            info!(project_id, commit = %request.commit_ref, "Duplicate trigger");
            return Ok(TriggerResponse::Duplicate);
        }

        let mut slots = self.slots();
        let slot = slots.entry(project_id.to_string()).or_insert_with(Slot::new);

        if slot.state == ProjectState::Analyzing {
            let same_as_running = slot
                .running
                .as_ref()
                .is_some_and(|r| r.commit_ref == request.commit_ref && !request.force);
            if same_as_running {
                return Ok(TriggerResponse::Duplicate);
            }
            if let Some(dropped) = slot.pending.replace(request) {
                info!(project_id, dropped = %dropped.commit_ref, "Pending request replaced");
            }
            info!(project_id, "Analysis queued");
            return Ok(TriggerResponse::Queued);
        }

        slot.state = ProjectState::Analyzing;
        slot.running = Some(request.clone());
        slot.idle.send_replace(false);
        drop(slots);

        info!(project_id, commit = %request.commit_ref, trigger = %request.trigger, "Analysis accepted");
        let scheduler = self.clone();
        let project_id = project_id.to_string();
        tokio::spawn(async move { scheduler.drive(project_id, request).await });
        Ok(TriggerResponse::Accepted)
    }

    /// Whether `commit_ref` names a commit with a live version.
    fn already_stored(&self, project_id: &str, commit_ref: &str) -> Result<bool, SchedulerError> {
        let looks_like_hash = commit_ref.len() >= SHORT_HASH_LEN && commit_ref.chars().all(|c| c.is_ascii_hexdigit());
        if !looks_like_hash {
            return Ok(false);
        }
        match self
            .store()
            .find_version(project_id, &VersionSelector::Commit(commit_ref.to_string()))
        {
            Ok(_) => Ok(true),
            Err(StorageError::VersionNotFound { .. }) | Err(StorageError::AmbiguousCommit { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Run requests for one project until its pending slot is empty.
    async fn drive(&self, project_id: String, mut request: AnalysisRequest) {
        loop {
            let outcome = self.run_once(&project_id, &request).await;

            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(&project_id) else {
                return;
            };
            match outcome {
                Ok(AnalysisOutcome::Persisted(version)) => {
                    slot.last_outcome = Some(LastOutcome::Persisted {
                        version_id: version.id,
                        commit_hash: version.commit_hash,
                    });
                }
                Ok(AnalysisOutcome::Duplicate { version_id, commit_hash }) => {
                    slot.last_outcome = Some(LastOutcome::Duplicate { version_id, commit_hash });
                }
                Err(e) => {
                    warn!(project_id = %project_id, commit = %request.commit_ref, error = %e, "Analysis failed");
                    slot.state = ProjectState::Failed;
                    slot.last_outcome = Some(LastOutcome::Failed {
                        commit_ref: request.commit_ref.clone(),
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    });
                    slot.last_failed = Some(request.clone());
                }
            }

            match slot.pending.take() {
                Some(next) => {
                    slot.state = ProjectState::Analyzing;
                    slot.running = Some(next.clone());
                    request = next;
                }
                None => {
                    slot.state = ProjectState::Idle;
                    slot.running = None;
                    slot.idle.send_replace(true);
                    return;
                }
            }
        }
    }

    async fn run_once(&self, project_id: &str, request: &AnalysisRequest) -> Result<AnalysisOutcome, AnalysisError> {
        let project = self.store().load_project(project_id)?;
        let ontology = self.ontology(project_id).await;
        let pipeline = self.inner.pipeline.clone();
        let request = request.clone();
        tokio::spawn(async move { pipeline.run(&project, &request, ontology).await })
            .await
            .map_err(|e| AnalysisError::Task(e.to_string()))?
    }

    /// Re-submit the most recent failed request. The request stays
    /// available for another retry when the submission is rejected.
    pub fn retry(&self, project_id: &str) -> Result<TriggerResponse, SchedulerError> {
        let request = self
            .slots()
            .get_mut(project_id)
            .and_then(|slot| slot.last_failed.take())
            .ok_or_else(|| SchedulerError::NothingToRetry(project_id.to_string()))?;
        match self.request_analysis(project_id, request.clone()) {
            Ok(response) => Ok(response),
            Err(e) => {
                if let Some(slot) = self.slots().get_mut(project_id) {
                    slot.last_failed.get_or_insert(request);
                }
                Err(e)
            }
        }
    }

    pub fn status(&self, project_id: &str) -> Result<ProjectStatus, SchedulerError> {
        self.store().load_project(project_id)?;
        let slots = self.slots();
        Ok(match slots.get(project_id) {
            Some(slot) => ProjectStatus {
                state: slot.state,
                running: slot.running.as_ref().map(|r| r.commit_ref.clone()),
                pending: slot.pending.as_ref().map(|r| r.commit_ref.clone()),
                last_outcome: slot.last_outcome.clone(),
            },
            None => ProjectStatus {
                state: ProjectState::Idle,
                running: None,
                pending: None,
                last_outcome: None,
            },
        })
    }

    /// Resolve once the project is idle with nothing pending.
    pub async fn wait_idle(&self, project_id: &str) {
        let receiver = self.slots().get(project_id).map(|slot| slot.idle.subscribe());
        if let Some(mut receiver) = receiver {
            // A closed channel means the slot was removed, which only happens when idle.
            let _ = receiver.wait_for(|idle| *idle).await;
        }
    }

    // Queries

    pub fn get_version(&self, project_id: &str, selector: &VersionSelector) -> Result<DiagramVersion, SchedulerError> {
        Ok(self.store().find_version(project_id, selector)?)
    }

    pub fn list_versions(&self, project_id: &str) -> Result<Vec<VersionSummary>, SchedulerError> {
        Ok(self.store().list_versions(project_id)?)
    }

    pub fn load_image(&self, project_id: &str, image_ref: &str) -> Result<Vec<u8>, SchedulerError> {
        Ok(self.store().load_image(project_id, image_ref)?)
    }
}
