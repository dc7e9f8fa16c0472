//! Snapshot error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while materializing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The commit or branch does not exist in the repository.
    #[error("Cannot resolve '{commit_ref}' in {repo_url}: {reason}")]
    UnresolvableRef {
        repo_url: String,
        commit_ref: String,
        reason: String,
    },

    /// Network, authentication or transport failure.
    #[error("Failed to fetch {repo_url}: {reason}")]
    Fetch { repo_url: String, reason: String },

    /// The operation did not finish within its time limit.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// IO error.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unresolvable(repo_url: &str, commit_ref: &str, reason: impl Into<String>) -> Self {
        Self::UnresolvableRef {
            repo_url: repo_url.to_string(),
            commit_ref: commit_ref.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fetch(repo_url: &str, reason: impl Into<String>) -> Self {
        Self::Fetch {
            repo_url: repo_url.to_string(),
            reason: reason.into(),
        }
    }
}
