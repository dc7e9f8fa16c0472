//! Snapshots taken by cloning with the `git` executable.

use super::{CommitInfo, SnapshotError, SnapshotHandle, SnapshotProvider};
use crate::config::Config;
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Field separator for `git log --format`.
const FIELD_SEP: char = '\u{1f}';

/// Run `git` with `args`, optionally inside `cwd`.
///
/// The child is killed if the returned future is dropped, so an enclosing
/// timeout never leaves a stray process behind.
pub async fn run_git(binary: &str, cwd: Option<&Path>, args: &[&str]) -> std::io::Result<Output> {
    let mut cmd = Command::new(binary);
    if let Some(dir) = cwd {
        cmd.arg("-C").arg(dir);
    }
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    cmd.output().await
}

fn stderr_of(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if text.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        text
    }
}

/// Resolve the commit a ref points at, trying remote-tracking branches too.
async fn rev_parse(binary: &str, dir: &Path, commit_ref: &str) -> Option<String> {
    let candidates = [
        format!("{commit_ref}^{{commit}}"),
        format!("origin/{commit_ref}^{{commit}}"),
    ];
    for candidate in &candidates {
        let output = run_git(binary, Some(dir), &["rev-parse", "--verify", "--quiet", candidate])
            .await
            .ok()?;
        if output.status.success() {
            let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !hash.is_empty() {
                return Some(hash);
            }
        }
    }
    None
}

/// Read hash, author and subject of `HEAD` in `dir`.
pub(crate) async fn head_commit(binary: &str, dir: &Path) -> Option<CommitInfo> {
    let format = format!("--format=%H{FIELD_SEP}%an{FIELD_SEP}%s");
    let output = run_git(binary, Some(dir), &["log", "-1", &format, "HEAD"]).await.ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut fields = stdout.trim_end().splitn(3, FIELD_SEP);
    let hash = fields.next()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }
    Some(CommitInfo {
        hash,
        author: fields.next().unwrap_or_default().to_string(),
        message: fields.next().unwrap_or_default().to_string(),
    })
}

/// Arguments that git would read as an option.
pub(crate) fn is_option_like(value: &str) -> bool {
    value.trim_start().starts_with('-')
}

/// Resolve the HEAD commit of a remote without cloning it.
pub async fn resolve_remote_head(
    binary: &str,
    repo_url: &str,
    limit: Duration,
) -> Result<String, SnapshotError> {
    if is_option_like(repo_url) {
        return Err(SnapshotError::fetch(repo_url, "repository URL must not start with '-'"));
    }
    let output = tokio::time::timeout(limit, run_git(binary, None, &["ls-remote", "--", repo_url, "HEAD"]))
        .await
        .map_err(|_| SnapshotError::Timeout {
            operation: format!("ls-remote {repo_url}"),
            secs: limit.as_secs(),
        })?
        .map_err(|e| SnapshotError::fetch(repo_url, e.to_string()))?;

    if !output.status.success() {
        return Err(SnapshotError::fetch(repo_url, stderr_of(&output)));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|line| line.split_whitespace().next().map(str::to_string))
        .ok_or_else(|| SnapshotError::unresolvable(repo_url, "HEAD", "remote has no HEAD"))
}

/// Clones the repository into a fresh temporary directory per call.
#[derive(Debug, Clone)]
pub struct GitSnapshotProvider {
    git_binary: String,
    timeout: Duration,
}

impl GitSnapshotProvider {
    pub fn new(git_binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            git_binary: git_binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.snapshot.git_binary.clone(),
            config.scheduler.fetch_timeout(),
        )
    }

    async fn checkout(&self, repo_url: &str, commit_ref: &str) -> Result<SnapshotHandle, SnapshotError> {
        let checkout = tempfile::Builder::new()
            .prefix("archdrift-")
            .tempdir()
            .map_err(|e| SnapshotError::io(std::env::temp_dir(), e))?;
        let dir = checkout.path();
        let dir_arg = dir.to_string_lossy();

        debug!(repo = repo_url, dir = %dir.display(), "Cloning");
        let clone = run_git(
            &self.git_binary,
            None,
            &["clone", "--quiet", "--no-checkout", "--", repo_url, &dir_arg],
        )
        .await
        .map_err(|e| SnapshotError::fetch(repo_url, e.to_string()))?;
        if !clone.status.success() {
            return Err(SnapshotError::fetch(repo_url, stderr_of(&clone)));
        }

        let hash = rev_parse(&self.git_binary, dir, commit_ref)
            .await
            .ok_or_else(|| SnapshotError::unresolvable(repo_url, commit_ref, "no such commit or branch"))?;

        let switch = run_git(
            &self.git_binary,
            Some(dir),
            &["checkout", "--quiet", "--detach", &hash],
        )
        .await
        .map_err(|e| SnapshotError::io(dir, e))?;
        if !switch.status.success() {
            return Err(SnapshotError::unresolvable(repo_url, commit_ref, stderr_of(&switch)));
        }

        let mut commit = head_commit(&self.git_binary, dir).await.unwrap_or_default();
        commit.hash = hash;
        info!(repo = repo_url, commit = %commit.hash, "Snapshot ready");
        Ok(SnapshotHandle::owned(checkout, commit))
    }
}

#[async_trait]
impl SnapshotProvider for GitSnapshotProvider {
    async fn snapshot(&self, repo_url: &str, commit_ref: &str) -> Result<SnapshotHandle, SnapshotError> {
        let commit_ref = if commit_ref.trim().is_empty() { "HEAD" } else { commit_ref.trim() };
        if is_option_like(repo_url) {
            return Err(SnapshotError::fetch(repo_url, "repository URL must not start with '-'"));
        }
        if is_option_like(commit_ref) {
            return Err(SnapshotError::unresolvable(repo_url, commit_ref, "not a commit, branch or tag"));
        }
        // Dropping the in-flight future on timeout kills git and removes the TempDir.
        tokio::time::timeout(self.timeout, self.checkout(repo_url, commit_ref))
            .await
            .map_err(|_| SnapshotError::Timeout {
                operation: format!("fetch {repo_url}"),
                secs: self.timeout.as_secs(),
            })?
    }

    async fn remote_head(&self, repo_url: &str) -> Result<String, SnapshotError> {
        resolve_remote_head(&self.git_binary, repo_url, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_fetch_error() {
        let provider = GitSnapshotProvider::new("archdrift-no-such-git", Duration::from_secs(5));
        let err = provider
            .snapshot("https://example.invalid/repo.git", "HEAD")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_remote_head_missing_binary() {
        let err = resolve_remote_head("archdrift-no-such-git", "https://example.invalid/x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_option_like_arguments_never_reach_git() {
        let provider = GitSnapshotProvider::new("git", Duration::from_secs(5));

        let err = provider.snapshot("--upload-pack=touch pwned", "HEAD").await.unwrap_err();
        assert!(matches!(&err, SnapshotError::Fetch { reason, .. } if reason.contains("must not start with '-'")));

        let err = provider
            .snapshot("https://example.invalid/repo.git", "--output=/tmp/x")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::UnresolvableRef { .. }));

        let err = resolve_remote_head("git", "-u evil", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(&err, SnapshotError::Fetch { reason, .. } if reason.contains("must not start with '-'")));
    }
}
