//! Read-only source snapshots of a repository at a commit.
//!
//! A [`SnapshotHandle`] owns whatever temporary storage backs it, so the
//! checkout is reclaimed when the handle is dropped, on success and failure
//! paths alike.

mod directory;
mod error;
mod git;

pub use directory::DirectorySnapshotProvider;
pub use error::SnapshotError;
pub use git::{resolve_remote_head, run_git, GitSnapshotProvider};
pub(crate) use git::is_option_like;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Commit metadata resolved while taking a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full commit hash.
    pub hash: String,
    /// Subject line of the commit message.
    pub message: String,
    pub author: String,
}

/// A materialized, read-only directory tree.
#[derive(Debug)]
pub struct SnapshotHandle {
    root: PathBuf,
    commit: CommitInfo,
    /// Temporary checkout deleted on drop; `None` for borrowed directories.
    _checkout: Option<TempDir>,
}

impl SnapshotHandle {
    /// A snapshot backed by a temporary checkout.
    pub fn owned(checkout: TempDir, commit: CommitInfo) -> Self {
        Self {
            root: checkout.path().to_path_buf(),
            commit,
            _checkout: Some(checkout),
        }
    }

    /// A snapshot of an existing directory that outlives the handle.
    pub fn borrowed(root: impl Into<PathBuf>, commit: CommitInfo) -> Self {
        Self {
            root: root.into(),
            commit,
            _checkout: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commit(&self) -> &CommitInfo {
        &self.commit
    }
}

/// Materializes repositories at a given commit.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Produce a snapshot of `repo_url` at `commit_ref` (a hash, branch or `HEAD`).
    async fn snapshot(&self, repo_url: &str, commit_ref: &str) -> Result<SnapshotHandle, SnapshotError>;

    /// Current head commit hash of `repo_url`, without materializing it.
    async fn remote_head(&self, repo_url: &str) -> Result<String, SnapshotError>;
}
