use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{StorageConfig, DEFAULT_ONTOLOGY_FILE, DEFAULT_PROJECT_FILE, DEFAULT_VERSION_FILE};
use crate::version::{DiagramVersion, Project};

use super::error::StorageError;
use super::{valid_id, valid_image_ref, ImageData, VersionStore};

const VERSIONS_DIR: &str = "versions";
const STAGING_PREFIX: &str = ".staging-";

/// File-based version store.
///
/// ```text
/// {data_dir}/projects/{project-id}/
///   project.json
///   ontology.yaml
///   versions/{version-id}/
///     version.json
///     {image-id}.{ext}
/// ```
///
/// A version directory is assembled under a hidden staging name and renamed
/// into place, so readers never observe a half-written version.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    root: PathBuf,
}

impl FileVersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.projects_path())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a project. Ids that could leave the store root are rejected.
    fn project_dir(&self, id: &str) -> Result<PathBuf, StorageError> {
        if !valid_id(id) {
            return Err(StorageError::InvalidProjectId(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    fn project_file(&self, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.project_dir(id)?.join(DEFAULT_PROJECT_FILE))
    }

    fn versions_dir(&self, project_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.project_dir(project_id)?.join(VERSIONS_DIR))
    }

    fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        }
        Ok(())
    }

    /// Write through a sibling temp file and rename over `path`.
    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents).map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
    }

    fn require_project(&self, id: &str) -> Result<(), StorageError> {
        if self.project_file(id)?.exists() {
            Ok(())
        } else {
            Err(StorageError::ProjectNotFound(id.to_string()))
        }
    }

    fn read_version(path: &Path) -> Result<DiagramVersion, StorageError> {
        let json = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn mark_superseded(&self, project_id: &str, version_id: &str) -> Result<(), StorageError> {
        let path = self.versions_dir(project_id)?.join(version_id).join(DEFAULT_VERSION_FILE);
        let mut version = Self::read_version(&path)?;
        version.superseded = true;
        Self::write_atomic(&path, serde_json::to_string_pretty(&version)?.as_bytes())
    }
}

impl VersionStore for FileVersionStore {
    fn save_project(&self, project: &Project) -> Result<(), StorageError> {
        let dir = self.project_dir(&project.id)?;
        Self::ensure_dir(&dir)?;
        let json = serde_json::to_string_pretty(project)?;
        Self::write_atomic(&dir.join(DEFAULT_PROJECT_FILE), json.as_bytes())
    }

    fn load_project(&self, id: &str) -> Result<Project, StorageError> {
        let path = self.project_file(id)?;
        if !path.exists() {
            return Err(StorageError::ProjectNotFound(id.to_string()));
        }
        let json = fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut projects = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            if let Some(id) = entry.file_name().to_str() {
                match self.load_project(id) {
                    Ok(project) => projects.push(project),
                    Err(_) => continue,
                }
            }
        }

        projects.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
        Ok(projects)
    }

    fn delete_project(&self, id: &str) -> Result<(), StorageError> {
        self.require_project(id)?;
        let dir = self.project_dir(id)?;
        fs::remove_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))
    }

    fn save_ontology(&self, project_id: &str, yaml: &str) -> Result<(), StorageError> {
        self.require_project(project_id)?;
        let path = self.project_dir(project_id)?.join(DEFAULT_ONTOLOGY_FILE);
        Self::write_atomic(&path, yaml.as_bytes())
    }

    fn load_ontology(&self, project_id: &str) -> Result<Option<String>, StorageError> {
        self.require_project(project_id)?;
        let path = self.project_dir(project_id)?.join(DEFAULT_ONTOLOGY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StorageError::io(&path, e))
    }

    fn persist_version(
        &self,
        mut version: DiagramVersion,
        images: Vec<ImageData>,
        supersedes: Option<&str>,
    ) -> Result<DiagramVersion, StorageError> {
        let mut project = self.load_project(&version.project_id)?;
        let versions_dir = self.versions_dir(&project.id)?;
        Self::ensure_dir(&versions_dir)?;
        if let Some(old) = supersedes {
            if !valid_id(old) || !versions_dir.join(old).join(DEFAULT_VERSION_FILE).exists() {
                return Err(StorageError::VersionNotFound {
                    project_id: project.id.clone(),
                    selector: old.to_string(),
                });
            }
        }

        version.sequence = self
            .load_versions(&project.id)?
            .first()
            .map(|v| v.sequence + 1)
            .unwrap_or(1);

        let staging = versions_dir.join(format!("{STAGING_PREFIX}{}", version.id));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| StorageError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| StorageError::io(&staging, e))?;

        let publish = || -> Result<(), StorageError> {
            let prefix = format!("{}/", version.id);
            for image in &images {
                let file = image
                    .image_ref
                    .strip_prefix(&prefix)
                    .filter(|rest| valid_image_ref(&image.image_ref) && !rest.contains('/'))
                    .ok_or_else(|| StorageError::InvalidReference(image.image_ref.clone()))?;
                let path = staging.join(file);
                fs::write(&path, &image.bytes).map_err(|e| StorageError::io(&path, e))?;
            }
            let path = staging.join(DEFAULT_VERSION_FILE);
            fs::write(&path, serde_json::to_string_pretty(&version)?).map_err(|e| StorageError::io(&path, e))?;

            let target = versions_dir.join(&version.id);
            fs::rename(&staging, &target).map_err(|e| StorageError::io(&target, e))
        };
        if let Err(e) = publish() {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if let Some(old) = supersedes {
            self.mark_superseded(&project.id, old)?;
        }

        project.last_commit_hash = Some(version.commit_hash.clone());
        self.save_project(&project)?;
        Ok(version)
    }

    fn load_versions(&self, project_id: &str) -> Result<Vec<DiagramVersion>, StorageError> {
        self.require_project(project_id)?;
        let dir = self.versions_dir(project_id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| StorageError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path().join(DEFAULT_VERSION_FILE);
            match Self::read_version(&path) {
                Ok(version) => versions.push(version),
                Err(_) => continue,
            }
        }

        versions.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(versions)
    }

    fn load_image(&self, project_id: &str, image_ref: &str) -> Result<Vec<u8>, StorageError> {
        self.require_project(project_id)?;
        if !valid_image_ref(image_ref) {
            return Err(StorageError::InvalidReference(image_ref.to_string()));
        }
        let path = self.versions_dir(project_id)?.join(image_ref);
        if !path.is_file() {
            return Err(StorageError::ImageNotFound(image_ref.to_string()));
        }
        fs::read(&path).map_err(|e| StorageError::io(&path, e))
    }
}
