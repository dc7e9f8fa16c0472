//! Snapshots of a local working directory.

use super::git::head_commit;
use super::{CommitInfo, SnapshotError, SnapshotHandle, SnapshotProvider};
use async_trait::async_trait;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Uses `repo_url` as a path to an existing directory.
///
/// If the directory is a git work tree, commit metadata comes from its
/// `HEAD`; only `HEAD` (or that exact hash) can be requested since the
/// working copy is never modified. Otherwise the commit hash is a digest of
/// the file contents.
#[derive(Debug, Clone)]
pub struct DirectorySnapshotProvider {
    git_binary: String,
}

impl Default for DirectorySnapshotProvider {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GIT_BINARY)
    }
}

impl DirectorySnapshotProvider {
    pub fn new(git_binary: impl Into<String>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }

    async fn describe(&self, root: &Path) -> Result<CommitInfo, SnapshotError> {
        if root.join(".git").exists() {
            if let Some(commit) = head_commit(&self.git_binary, root).await {
                return Ok(commit);
            }
        }
        let owned = root.to_path_buf();
        let hash = tokio::task::spawn_blocking(move || content_hash(&owned))
            .await
            .map_err(|e| SnapshotError::io(root, std::io::Error::other(e.to_string())))??;
        Ok(CommitInfo {
            hash,
            message: "Working tree snapshot".to_string(),
            author: String::new(),
        })
    }

    fn directory(repo_url: &str) -> Result<PathBuf, SnapshotError> {
        let path = PathBuf::from(repo_url.strip_prefix("file://").unwrap_or(repo_url));
        if path.is_dir() {
            Ok(path)
        } else {
            Err(SnapshotError::fetch(repo_url, "not a readable directory"))
        }
    }
}

/// Hex sha256 over sorted relative paths and file contents.
pub(crate) fn content_hash(root: &Path) -> Result<String, SnapshotError> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let mut hasher = Sha256::new();
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let bytes = std::fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);
        hasher.update(&bytes);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl SnapshotProvider for DirectorySnapshotProvider {
    async fn snapshot(&self, repo_url: &str, commit_ref: &str) -> Result<SnapshotHandle, SnapshotError> {
        let root = Self::directory(repo_url)?;
        let commit = self.describe(&root).await?;

        let wanted = commit_ref.trim();
        let matches = wanted.is_empty()
            || wanted.eq_ignore_ascii_case("HEAD")
            || (wanted.len() >= 7 && commit.hash.starts_with(wanted));
        if !matches {
            return Err(SnapshotError::unresolvable(
                repo_url,
                wanted,
                format!("working directory is at {}", commit.hash),
            ));
        }
        Ok(SnapshotHandle::borrowed(root, commit))
    }

    async fn remote_head(&self, repo_url: &str) -> Result<String, SnapshotError> {
        let root = Self::directory(repo_url)?;
        Ok(self.describe(&root).await?.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_plain_directory_hash_tracks_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let provider = DirectorySnapshotProvider::default();
        let url = dir.path().to_string_lossy().to_string();

        let first = provider.snapshot(&url, "HEAD").await.unwrap();
        assert_eq!(first.root(), dir.path());
        assert_eq!(first.commit().hash.len(), 64);

        let again = provider.remote_head(&url).await.unwrap();
        assert_eq!(again, first.commit().hash);

        std::fs::write(dir.path().join("a.py"), "x = 2\n").unwrap();
        let changed = provider.remote_head(&url).await.unwrap();
        assert_ne!(changed, first.commit().hash);
    }

    #[tokio::test]
    async fn test_unknown_ref_is_unresolvable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();
        let provider = DirectorySnapshotProvider::default();
        let err = provider
            .snapshot(&dir.path().to_string_lossy(), "feature/missing")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::UnresolvableRef { .. }));
    }

    #[tokio::test]
    async fn test_missing_directory_is_fetch_error() {
        let provider = DirectorySnapshotProvider::default();
        let err = provider.snapshot("/definitely/not/here", "HEAD").await.unwrap_err();
        assert!(matches!(err, SnapshotError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_dropping_borrowed_handle_keeps_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn main() {}\n").unwrap();
        let provider = DirectorySnapshotProvider::default();
        let handle = provider.snapshot(&dir.path().to_string_lossy(), "").await.unwrap();
        drop(handle);
        assert!(dir.path().join("lib.rs").exists());
    }
}
