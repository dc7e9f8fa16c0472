use super::CompiledOntology;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-project ontologies.
///
/// Readers clone an `Arc` and release the lock immediately, so an edit never
/// changes the rules seen by a run already in progress.
#[derive(Debug, Default)]
pub struct OntologyStore {
    ontologies: RwLock<HashMap<String, Arc<CompiledOntology>>>,
}

impl OntologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, project_id: &str) -> Option<Arc<CompiledOntology>> {
        self.ontologies.read().await.get(project_id).cloned()
    }

    /// Replace the ontology of a project, returning the previous one.
    pub async fn set(&self, project_id: &str, ontology: CompiledOntology) -> Option<Arc<CompiledOntology>> {
        self.ontologies
            .write()
            .await
            .insert(project_id.to_string(), Arc::new(ontology))
    }

    pub async fn remove(&self, project_id: &str) -> Option<Arc<CompiledOntology>> {
        self.ontologies.write().await.remove(project_id)
    }

    pub async fn contains(&self, project_id: &str) -> bool {
        self.ontologies.read().await.contains_key(project_id)
    }
}
