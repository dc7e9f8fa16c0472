//! Persisted records: projects and their analyzed versions.

use crate::config::SHORT_HASH_LEN;
use crate::drift::{Severity, Violation};
use crate::graph::{EndpointRecord, FileFailure, GraphDigest, GraphStats};
use crate::render::{DiagramType, RenderFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A tracked repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub repo_url: String,
    pub created_at: DateTime<Utc>,
    /// Commit of the newest persisted version.
    #[serde(default)]
    pub last_commit_hash: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            repo_url: repo_url.into(),
            created_at: Utc::now(),
            last_commit_hash: None,
        }
    }
}

/// Where an analysis request came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    #[default]
    Manual,
    PostCommitHook,
    Webhook,
    Poller,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::PostCommitHook => "post_commit_hook",
            TriggerSource::Webhook => "webhook",
            TriggerSource::Poller => "poller",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether drift detection ran for a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftStatus {
    #[default]
    Evaluated,
    Unevaluated { reason: String },
}

impl DriftStatus {
    pub fn is_evaluated(&self) -> bool {
        matches!(self, DriftStatus::Evaluated)
    }
}

/// Markers for results that are present but degraded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_failures: Vec<FileFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub render_failures: Vec<RenderFailure>,
    #[serde(default)]
    pub drift: DriftStatus,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.parse_failures.is_empty() && self.render_failures.is_empty() && self.drift.is_evaluated()
    }

    pub fn failed_diagram_types(&self) -> Vec<DiagramType> {
        let mut types: Vec<DiagramType> = self.render_failures.iter().map(|f| f.diagram_type).collect();
        types.sort();
        types.dedup();
        types
    }
}

/// A rendered diagram stored alongside a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramImage {
    pub id: String,
    pub diagram_type: DiagramType,
    /// Module name for per-module diagrams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub description: String,
    /// Store-relative key of the image bytes.
    pub image_ref: String,
    pub media_type: String,
}

/// The analysis record of one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramVersion {
    pub id: String,
    pub project_id: String,
    /// Position in the project's history, assigned on persist.
    #[serde(default)]
    pub sequence: u64,
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub trigger_source: TriggerSource,
    pub created_at: DateTime<Utc>,
    pub readme_content: String,
    pub summary_content: String,
    pub images: Vec<DiagramImage>,
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub superseded: bool,
    pub graph_stats: GraphStats,
    pub graph_digest: GraphDigest,
    pub endpoints: Vec<EndpointRecord>,
    pub completeness: Completeness,
}

impl DiagramVersion {
    pub fn short_hash(&self) -> &str {
        short_hash(&self.commit_hash)
    }

    /// Images grouped by diagram type, in type order.
    pub fn images_by_type(&self) -> BTreeMap<DiagramType, Vec<&DiagramImage>> {
        let mut groups: BTreeMap<DiagramType, Vec<&DiagramImage>> = BTreeMap::new();
        for image in &self.images {
            groups.entry(image.diagram_type).or_default().push(image);
        }
        groups
    }

    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id.clone(),
            sequence: self.sequence,
            commit_hash: self.commit_hash.clone(),
            commit_message: self.commit_message.clone(),
            author: self.author.clone(),
            trigger_source: self.trigger_source,
            created_at: self.created_at,
            superseded: self.superseded,
            image_count: self.images.len(),
            violation_count: self.violations.len(),
            highest_severity: self.violations.iter().map(|v| v.severity).min(),
            complete: self.completeness.is_complete(),
        }
    }
}

/// Listing entry for a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: String,
    pub sequence: u64,
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    pub trigger_source: TriggerSource,
    pub created_at: DateTime<Utc>,
    pub superseded: bool,
    pub image_count: usize,
    pub violation_count: usize,
    pub highest_severity: Option<Severity>,
    pub complete: bool,
}

impl VersionSummary {
    pub fn short_hash(&self) -> &str {
        short_hash(&self.commit_hash)
    }
}

/// First [`SHORT_HASH_LEN`] characters of a commit hash.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}
