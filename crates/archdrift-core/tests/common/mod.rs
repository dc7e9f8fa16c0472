#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archdrift_core::config::ExtractionConfig;
use archdrift_core::graph::{GraphDigest, GraphStats};
use archdrift_core::render::projection::Projection;
use archdrift_core::render::{RenderBackend, RenderError, RenderedBytes};
use archdrift_core::snapshot::{CommitInfo, SnapshotError, SnapshotHandle};
use archdrift_core::storage::MemoryVersionStore;
use archdrift_core::version::Completeness;
use archdrift_core::{
    DiagramType, DiagramVersion, Extractor, Pipeline, Renderer, Scheduler, SnapshotProvider, TriggerSource,
    VersionStore,
};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const GATEWAY_ONTOLOGY: &str = r#"
rules:
  - rule_id: gateway-isolation
    kind: forbidden_edge
    severity: critical
    source: "gateway\\..*"
    target: "firmware\\..*"
"#;

pub fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

/// A small Python tree: a gateway module reaching into a firmware driver,
/// plus one HTTP endpoint.
pub fn gateway_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "gateway/module.py", "import firmware.driver\n\ndef forward():\n    pass\n");
    write(dir.path(), "firmware/driver.py", "class Driver:\n    def init(self):\n        pass\n");
    write(
        dir.path(),
        "api.py",
        "from flask import Flask\napp = Flask(__name__)\n\n@app.get(\"/health\")\ndef health():\n    pass\n",
    );
    dir
}

/// Same tree with the forbidden import removed.
pub fn clean_gateway_tree() -> TempDir {
    let dir = gateway_tree();
    write(dir.path(), "gateway/module.py", "def forward():\n    pass\n");
    dir
}

pub fn commit(hash: &str, message: &str) -> CommitInfo {
    CommitInfo {
        hash: hash.to_string(),
        message: message.to_string(),
        author: "dev".to_string(),
    }
}

/// Serves pre-built directories for named refs.
///
/// With a gate installed every snapshot waits for one permit, which lets a
/// test hold an analysis in flight.
#[derive(Default)]
pub struct FakeSnapshots {
    refs: Mutex<HashMap<String, (PathBuf, CommitInfo)>>,
    head: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub calls: AtomicUsize,
}

impl FakeSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, commit_ref: &str, root: &Path, info: CommitInfo) {
        self.refs
            .lock()
            .unwrap()
            .insert(commit_ref.to_string(), (root.to_path_buf(), info.clone()));
        self.refs
            .lock()
            .unwrap()
            .insert(info.hash.clone(), (root.to_path_buf(), info));
    }

    pub fn set_head(&self, hash: &str) {
        *self.head.lock().unwrap() = Some(hash.to_string());
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for FakeSnapshots {
    async fn snapshot(&self, repo_url: &str, commit_ref: &str) -> Result<SnapshotHandle, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        let entry = self.refs.lock().unwrap().get(commit_ref).cloned();
        match entry {
            Some((root, info)) => Ok(SnapshotHandle::borrowed(root, info)),
            None => Err(SnapshotError::unresolvable(repo_url, commit_ref, "unknown ref")),
        }
    }

    async fn remote_head(&self, repo_url: &str) -> Result<String, SnapshotError> {
        self.head
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SnapshotError::fetch(repo_url, "no head configured"))
    }
}

/// Returns the DOT text as the image, failing for chosen diagram types.
#[derive(Default)]
pub struct FakeBackend {
    failing: HashSet<DiagramType>,
    delay: Option<Duration>,
}

impl FakeBackend {
    pub fn failing(types: &[DiagramType]) -> Self {
        Self {
            failing: types.iter().copied().collect(),
            delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            failing: HashSet::new(),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn render(&self, projection: &Projection) -> Result<RenderedBytes, RenderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&projection.diagram_type) {
            return Err(RenderError::Backend(format!("cannot draw {}", projection.diagram_type)));
        }
        Ok(RenderedBytes {
            bytes: projection.dot.clone().into_bytes(),
            media_type: "text/vnd.graphviz".to_string(),
            extension: "dot".to_string(),
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub snapshots: Arc<FakeSnapshots>,
    pub store: Arc<MemoryVersionStore>,
}

pub fn harness(backend: FakeBackend) -> Harness {
    let snapshots = Arc::new(FakeSnapshots::new());
    let store = Arc::new(MemoryVersionStore::new());
    let renderer = Renderer::new(Arc::new(backend), Duration::from_secs(5), DiagramType::ALL.to_vec());
    let pipeline = Pipeline::new(
        snapshots.clone(),
        Arc::new(Extractor::new(ExtractionConfig::default())),
        renderer,
        store.clone() as Arc<dyn VersionStore>,
    );
    Harness {
        scheduler: Scheduler::new(pipeline),
        snapshots,
        store,
    }
}

/// A bare version record for storage tests.
pub fn version(project_id: &str, hash: &str) -> DiagramVersion {
    DiagramVersion {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        sequence: 0,
        commit_hash: hash.to_string(),
        commit_message: format!("commit {hash}"),
        author: "dev".to_string(),
        branch: None,
        trigger_source: TriggerSource::Manual,
        created_at: chrono::Utc::now(),
        readme_content: String::new(),
        summary_content: String::new(),
        images: Vec::new(),
        violations: Vec::new(),
        superseded: false,
        graph_stats: GraphStats::default(),
        graph_digest: GraphDigest::default(),
        endpoints: Vec::new(),
        completeness: Completeness::default(),
    }
}
