//! Persistence of projects, versions and diagram images.

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileVersionStore;
pub use memory::MemoryVersionStore;

use crate::config::SHORT_HASH_LEN;
use crate::version::{DiagramVersion, Project, VersionSummary};
use std::fmt;
use std::str::FromStr;

/// Image bytes to be stored under a version's `image_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub image_ref: String,
    pub bytes: Vec<u8>,
}

/// Which version of a project to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    /// Full commit hash or an unambiguous prefix.
    Commit(String),
}

impl FromStr for VersionSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            Ok(VersionSelector::Latest)
        } else {
            Ok(VersionSelector::Commit(s.to_string()))
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => f.write_str("latest"),
            VersionSelector::Commit(hash) => f.write_str(hash),
        }
    }
}

/// Storage backend for projects and their versions.
///
/// Versions are append-only: once persisted, only the `superseded` flag of
/// a version ever changes.
pub trait VersionStore: Send + Sync {
    fn save_project(&self, project: &Project) -> Result<(), StorageError>;

    fn load_project(&self, id: &str) -> Result<Project, StorageError>;

    /// All projects, oldest first.
    fn list_projects(&self) -> Result<Vec<Project>, StorageError>;

    /// Delete a project with every version, image and ontology it owns.
    fn delete_project(&self, id: &str) -> Result<(), StorageError>;

    fn save_ontology(&self, project_id: &str, yaml: &str) -> Result<(), StorageError>;

    fn load_ontology(&self, project_id: &str) -> Result<Option<String>, StorageError>;

    /// Publish a version and its images as one unit.
    ///
    /// Assigns the next sequence number, marks `supersedes` (a version id)
    /// as superseded and records the commit on the project.
    fn persist_version(
        &self,
        version: DiagramVersion,
        images: Vec<ImageData>,
        supersedes: Option<&str>,
    ) -> Result<DiagramVersion, StorageError>;

    /// All versions of a project, newest first.
    fn load_versions(&self, project_id: &str) -> Result<Vec<DiagramVersion>, StorageError>;

    fn load_image(&self, project_id: &str, image_ref: &str) -> Result<Vec<u8>, StorageError>;

    /// Version summaries, newest first.
    fn list_versions(&self, project_id: &str) -> Result<Vec<VersionSummary>, StorageError> {
        Ok(self
            .load_versions(project_id)?
            .iter()
            .map(DiagramVersion::summary)
            .collect())
    }

    /// The live (non-superseded) version for an exact commit hash.
    fn find_current(&self, project_id: &str, commit_hash: &str) -> Result<Option<DiagramVersion>, StorageError> {
        Ok(self
            .load_versions(project_id)?
            .into_iter()
            .find(|v| !v.superseded && v.commit_hash == commit_hash))
    }

    /// Resolve a selector to a live version.
    fn find_version(&self, project_id: &str, selector: &VersionSelector) -> Result<DiagramVersion, StorageError> {
        let live: Vec<DiagramVersion> = self
            .load_versions(project_id)?
            .into_iter()
            .filter(|v| !v.superseded)
            .collect();
        let not_found = || StorageError::VersionNotFound {
            project_id: project_id.to_string(),
            selector: selector.to_string(),
        };

        match selector {
            VersionSelector::Latest => live.into_iter().next().ok_or_else(not_found),
            VersionSelector::Commit(wanted) => {
                let wanted = wanted.to_ascii_lowercase();
                if let Some(exact) = live.iter().find(|v| v.commit_hash == wanted) {
                    return Ok(exact.clone());
                }
                if wanted.len() < SHORT_HASH_LEN {
                    return Err(StorageError::PrefixTooShort(wanted));
                }
                let mut matches: Vec<DiagramVersion> = live
                    .into_iter()
                    .filter(|v| v.commit_hash.starts_with(&wanted))
                    .collect();
                match matches.len() {
                    0 => Err(not_found()),
                    1 => Ok(matches.remove(0)),
                    n => Err(StorageError::AmbiguousCommit {
                        prefix: wanted,
                        matches: n,
                    }),
                }
            }
        }
    }
}

/// Whether an id can name a directory directly under its parent.
pub(crate) fn valid_id(id: &str) -> bool {
    !id.contains('/') && valid_image_ref(id)
}

/// Whether an image reference stays inside its version directory.
pub(crate) fn valid_image_ref(image_ref: &str) -> bool {
    !image_ref.is_empty()
        && image_ref.split('/').all(|part| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
}
