use serde::{Deserialize, Serialize};

use crate::pipeline::AnalysisRequest;
use crate::version::TriggerSource;

/// Body posted by commit hooks and CI jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub project_id: String,
    #[serde(default, alias = "commit", alias = "sha")]
    pub commit_sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub branch: String,
}

impl TriggerPayload {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Ref to analyse: the commit, else the branch head, else `HEAD`.
    pub fn commit_ref(&self) -> &str {
        [self.commit_sha.trim(), self.branch.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("HEAD")
    }

    pub fn into_request(self, source: TriggerSource) -> AnalysisRequest {
        let mut request = AnalysisRequest::new(self.commit_ref(), source);
        request.message = Some(self.message).filter(|m| !m.trim().is_empty());
        request.author = Some(self.author).filter(|a| !a.trim().is_empty());
        request.branch = Some(self.branch).filter(|b| !b.trim().is_empty());
        request
    }
}

/// Immediate answer to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerResponse {
    /// A run started.
    Accepted,
    /// A run is in progress; this request holds the pending slot.
    Queued,
    /// The commit already has a version (or is being analysed).
    Duplicate,
}

impl TriggerResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerResponse::Accepted => "accepted",
            TriggerResponse::Queued => "queued",
            TriggerResponse::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for TriggerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parsing_and_ref() {
        let payload = TriggerPayload::from_json(
            r#"{"project_id":"p1","sha":"abc1234def","message":"Fix login","author":"dana","branch":"main"}"#,
        )
        .unwrap();
        assert_eq!(payload.commit_ref(), "abc1234def");

        let request = payload.into_request(TriggerSource::Webhook);
        assert_eq!(request.commit_ref, "abc1234def");
        assert_eq!(request.message.as_deref(), Some("Fix login"));
        assert_eq!(request.branch.as_deref(), Some("main"));
        assert_eq!(request.trigger, TriggerSource::Webhook);
    }

    #[test]
    fn test_branch_fallback() {
        let payload = TriggerPayload {
            project_id: "p".into(),
            branch: "release".into(),
            ..Default::default()
        };
        assert_eq!(payload.commit_ref(), "release");
        assert_eq!(TriggerPayload::default().commit_ref(), "HEAD");
        assert!(TriggerPayload::default().into_request(TriggerSource::Manual).author.is_none());
    }
}
