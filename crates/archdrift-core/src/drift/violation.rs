use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Violation severity. Declaration order is the reporting order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "critical")]
    Critical,
    #[serde(alias = "high")]
    High,
    #[default]
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "low")]
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One architecture-rule breach recorded on a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    /// The offending entity (or the cycle participants).
    pub component: String,
    pub expected: String,
    /// Observed instances, sorted.
    pub actual: Vec<String>,
    pub explanation: String,
    pub suggested_fix: String,
}

impl Violation {
    /// Deterministic id for a (rule, component) pair.
    pub fn id_for(rule_id: &str, component: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(rule_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(component.as_bytes());
        let mut id = hex::encode(hasher.finalize());
        id.truncate(16);
        id
    }

    /// Key used to match violations across versions.
    pub fn key(&self) -> (&str, &str) {
        (&self.rule_id, &self.component)
    }
}

/// Reporting order: severity, then rule, then component.
pub fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (a.severity, &a.rule_id, &a.component).cmp(&(b.severity, &b.rule_id, &b.component))
    });
}
