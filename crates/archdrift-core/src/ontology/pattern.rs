use super::OntologyError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A regular expression matched against the whole qualified node name.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(rule_id: &str, source: &str) -> Result<Self, OntologyError> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| OntologyError::InvalidPattern {
            rule_id: rule_id.to_string(),
            pattern: source.to_string(),
            source: e,
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Which nodes a rule looks at, as written in the ontology file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl ScopeSpec {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Compiled include/exclude selector. An empty include list selects everything.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl Scope {
    pub fn compile(rule_id: &str, spec: &ScopeSpec) -> Result<Self, OntologyError> {
        let compile_all = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(rule_id, p))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile_all(&spec.include)?,
            exclude: compile_all(&spec.exclude)?,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }
}
