use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::version::{DiagramVersion, Project};

use super::error::StorageError;
use super::{valid_image_ref, ImageData, VersionStore};

#[derive(Debug, Default)]
struct Entry {
    project: Option<Project>,
    ontology: Option<String>,
    /// Oldest first.
    versions: Vec<DiagramVersion>,
    images: HashMap<String, Vec<u8>>,
}

/// In-process version store for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StorageError> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn existing<'a>(entries: &'a mut HashMap<String, Entry>, id: &str) -> Result<&'a mut Entry, StorageError> {
    entries
        .get_mut(id)
        .filter(|e| e.project.is_some())
        .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))
}

impl VersionStore for MemoryVersionStore {
    fn save_project(&self, project: &Project) -> Result<(), StorageError> {
        self.lock()?.entry(project.id.clone()).or_default().project = Some(project.clone());
        Ok(())
    }

    fn load_project(&self, id: &str) -> Result<Project, StorageError> {
        self.lock()?
            .get(id)
            .and_then(|e| e.project.clone())
            .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        let mut projects: Vec<Project> = self.lock()?.values().filter_map(|e| e.project.clone()).collect();
        projects.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
        Ok(projects)
    }

    fn delete_project(&self, id: &str) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        existing(&mut entries, id)?;
        entries.remove(id);
        Ok(())
    }

    fn save_ontology(&self, project_id: &str, yaml: &str) -> Result<(), StorageError> {
        existing(&mut *self.lock()?, project_id)?.ontology = Some(yaml.to_string());
        Ok(())
    }

    fn load_ontology(&self, project_id: &str) -> Result<Option<String>, StorageError> {
        Ok(existing(&mut *self.lock()?, project_id)?.ontology.clone())
    }

    fn persist_version(
        &self,
        mut version: DiagramVersion,
        images: Vec<ImageData>,
        supersedes: Option<&str>,
    ) -> Result<DiagramVersion, StorageError> {
        let mut entries = self.lock()?;
        let entry = existing(&mut entries, &version.project_id)?;

        if let Some(bad) = images.iter().find(|i| !valid_image_ref(&i.image_ref)) {
            return Err(StorageError::InvalidReference(bad.image_ref.clone()));
        }
        if let Some(old) = supersedes {
            if !entry.versions.iter().any(|v| v.id == old) {
                return Err(StorageError::VersionNotFound {
                    project_id: version.project_id.clone(),
                    selector: old.to_string(),
                });
            }
        }

        version.sequence = entry.versions.last().map(|v| v.sequence + 1).unwrap_or(1);
        for image in images {
            entry.images.insert(image.image_ref, image.bytes);
        }
        if let Some(old) = supersedes {
            for v in entry.versions.iter_mut().filter(|v| v.id == old) {
                v.superseded = true;
            }
        }
        entry.versions.push(version.clone());
        if let Some(project) = entry.project.as_mut() {
            project.last_commit_hash = Some(version.commit_hash.clone());
        }
        Ok(version)
    }

    fn load_versions(&self, project_id: &str) -> Result<Vec<DiagramVersion>, StorageError> {
        let mut entries = self.lock()?;
        Ok(existing(&mut entries, project_id)?.versions.iter().rev().cloned().collect())
    }

    fn load_image(&self, project_id: &str, image_ref: &str) -> Result<Vec<u8>, StorageError> {
        let mut entries = self.lock()?;
        existing(&mut entries, project_id)?
            .images
            .get(image_ref)
            .cloned()
            .ok_or_else(|| StorageError::ImageNotFound(image_ref.to_string()))
    }
}
