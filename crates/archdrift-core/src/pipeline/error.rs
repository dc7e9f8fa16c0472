use thiserror::Error;

use crate::extract::ExtractError;
use crate::snapshot::SnapshotError;
use crate::storage::StorageError;

/// Fatal analysis failures. Nothing is persisted when one of these occurs.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    /// Short machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Snapshot(SnapshotError::UnresolvableRef { .. }) => "unresolvable_ref",
            AnalysisError::Snapshot(SnapshotError::Timeout { .. }) => "fetch_timeout",
            AnalysisError::Snapshot(_) => "fetch_error",
            AnalysisError::Extract(ExtractError::EmptyGraph { .. }) => "empty_graph",
            AnalysisError::Extract(_) => "extract_error",
            AnalysisError::Storage(_) => "storage_error",
            AnalysisError::Task(_) => "task_error",
        }
    }
}
