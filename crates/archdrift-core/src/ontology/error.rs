use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or compiling an ontology.
#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("Failed to parse ontology: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Rule '{rule_id}': invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        rule_id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OntologyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OntologyError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(rule_id: &str, reason: impl Into<String>) -> Self {
        OntologyError::InvalidRule {
            rule_id: rule_id.to_string(),
            reason: reason.into(),
        }
    }
}
