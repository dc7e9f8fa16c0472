use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("No version matching '{selector}' in project {project_id}")]
    VersionNotFound { project_id: String, selector: String },

    #[error("Commit prefix '{prefix}' is ambiguous ({matches} versions match)")]
    AmbiguousCommit { prefix: String, matches: usize },

    #[error("Commit prefix '{0}' is too short; use at least 7 characters")]
    PrefixTooShort(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ProjectNotFound(_) | StorageError::VersionNotFound { .. } | StorageError::ImageNotFound(_)
        )
    }
}
