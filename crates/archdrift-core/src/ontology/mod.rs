//! Declared target architecture.
//!
//! An ontology is a YAML document holding a list of rules:
//!
//! ```yaml
//! rules:
//!   - rule_id: gateway-isolation
//!     kind: forbidden_edge
//!     severity: critical
//!     source: "gateway.*"
//!     target: "firmware.*"
//!   - rule_id: acyclic
//!     kind: no_cycle
//!   - rule_id: layering
//!     kind: layer_order
//!     layers:
//!       - name: api
//!         patterns: ["api(\\..*)?"]
//!       - name: domain
//!         patterns: ["domain(\\..*)?"]
//! baseline:
//!   dependencies: true
//! ```
//!
//! The optional `baseline` section picks the comparisons made against the
//! project's previous version (see [`crate::drift::baseline`]).
//!
//! Files are validated up front and compiled into a [`CompiledOntology`],
//! which the drift detector reads without further checks.

mod error;
mod pattern;
mod store;

pub use error::OntologyError;
pub use pattern::{Pattern, Scope, ScopeSpec};
pub use store::OntologyStore;

use crate::drift::{baseline, Severity};
use crate::graph::{EdgeKind, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// The four rule families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    ForbiddenEdge,
    NoCycle,
    LayerOrder,
    AllowedExportSurface,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::ForbiddenEdge => "forbidden_edge",
            RuleKind::NoCycle => "no_cycle",
            RuleKind::LayerOrder => "layer_order",
            RuleKind::AllowedExportSurface => "allowed_export_surface",
        }
    }
}

/// One named layer in a `layer_order` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub patterns: Vec<String>,
    /// Layers this one may depend on besides itself. When absent, every
    /// layer listed below it is allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub may_use: Option<Vec<String>>,
}

/// Kind-specific rule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleBody {
    ForbiddenEdge { source: String, target: String },
    NoCycle,
    LayerOrder { layers: Vec<LayerSpec> },
    AllowedExportSurface { allowed_kinds: Vec<NodeKind> },
}

impl RuleBody {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleBody::ForbiddenEdge { .. } => RuleKind::ForbiddenEdge,
            RuleBody::NoCycle => RuleKind::NoCycle,
            RuleBody::LayerOrder { .. } => RuleKind::LayerOrder,
            RuleBody::AllowedExportSurface { .. } => RuleKind::AllowedExportSurface,
        }
    }
}

/// A rule as written in the ontology file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub rule_id: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "ScopeSpec::is_empty")]
    pub scope: ScopeSpec,
    /// Edge kinds the rule inspects; `imports` when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeKind>,
    #[serde(default)]
    pub include_external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(flatten)]
    pub body: RuleBody,
}

/// Which comparisons with the previous version to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineChecks {
    /// Removed endpoints, moved routes and deleted handlers.
    #[serde(default = "enabled")]
    pub endpoints: bool,
    /// Calls and base classes pointing at a deleted symbol.
    #[serde(default = "enabled")]
    pub references: bool,
    /// Added and removed imports.
    #[serde(default)]
    pub dependencies: bool,
}

impl Default for BaselineChecks {
    fn default() -> Self {
        Self {
            endpoints: true,
            references: true,
            dependencies: false,
        }
    }
}

impl BaselineChecks {
    pub fn any(&self) -> bool {
        self.endpoints || self.references || self.dependencies
    }
}

fn enabled() -> bool {
    true
}

/// An ontology document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub baseline: BaselineChecks,
}

impl Ontology {
    pub fn from_yaml(yaml: &str) -> Result<Self, OntologyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, OntologyError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, OntologyError> {
        let content = std::fs::read_to_string(path).map_err(|e| OntologyError::io(path, e))?;
        Self::from_yaml(&content)
    }
}

/// A layer with compiled patterns and the resolved set of allowed targets.
#[derive(Debug, Clone)]
pub struct CompiledLayer {
    pub name: String,
    pub patterns: Vec<Pattern>,
    /// Layer names (including itself) this layer may depend on.
    pub allowed: BTreeSet<String>,
}

impl CompiledLayer {
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// Compiled kind-specific parameters.
#[derive(Debug, Clone)]
pub enum RuleCheck {
    ForbiddenEdge { source: Pattern, target: Pattern },
    NoCycle,
    LayerOrder { layers: Vec<CompiledLayer> },
    AllowedExportSurface { allowed: BTreeSet<NodeKind> },
}

/// A validated rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule_id: String,
    pub kind: RuleKind,
    pub severity: Severity,
    pub scope: Scope,
    pub edges: BTreeSet<EdgeKind>,
    pub include_external: bool,
    pub explanation: Option<String>,
    pub suggested_fix: Option<String>,
    pub check: RuleCheck,
}

impl CompiledRule {
    fn compile(spec: &RuleSpec) -> Result<Self, OntologyError> {
        let id = spec.rule_id.as_str();
        let check = match &spec.body {
            RuleBody::ForbiddenEdge { source, target } => RuleCheck::ForbiddenEdge {
                source: Pattern::new(id, source)?,
                target: Pattern::new(id, target)?,
            },
            RuleBody::NoCycle => RuleCheck::NoCycle,
            RuleBody::LayerOrder { layers } => RuleCheck::LayerOrder {
                layers: compile_layers(id, layers)?,
            },
            RuleBody::AllowedExportSurface { allowed_kinds } => RuleCheck::AllowedExportSurface {
                allowed: allowed_kinds.iter().copied().collect(),
            },
        };

        let mut edges: BTreeSet<EdgeKind> = spec.edges.iter().copied().collect();
        if edges.is_empty() {
            edges.insert(EdgeKind::Imports);
        }

        Ok(Self {
            rule_id: spec.rule_id.clone(),
            kind: spec.body.kind(),
            severity: spec.severity,
            scope: Scope::compile(id, &spec.scope)?,
            edges,
            include_external: spec.include_external,
            explanation: spec.explanation.clone(),
            suggested_fix: spec.suggested_fix.clone(),
            check,
        })
    }

    pub fn inspects(&self, kind: EdgeKind) -> bool {
        self.edges.contains(&kind)
    }
}

fn compile_layers(rule_id: &str, layers: &[LayerSpec]) -> Result<Vec<CompiledLayer>, OntologyError> {
    if layers.is_empty() {
        return Err(OntologyError::invalid(rule_id, "layer_order needs at least one layer"));
    }

    let mut names = HashSet::new();
    for layer in layers {
        if !names.insert(layer.name.as_str()) {
            return Err(OntologyError::invalid(
                rule_id,
                format!("duplicate layer '{}'", layer.name),
            ));
        }
        if layer.patterns.is_empty() {
            return Err(OntologyError::invalid(
                rule_id,
                format!("layer '{}' has no patterns", layer.name),
            ));
        }
    }

    layers
        .iter()
        .enumerate()
        .map(|(index, layer)| {
            let mut allowed: BTreeSet<String> = match &layer.may_use {
                Some(targets) => {
                    for target in targets {
                        if !names.contains(target.as_str()) {
                            return Err(OntologyError::invalid(
                                rule_id,
                                format!("layer '{}' may_use unknown layer '{}'", layer.name, target),
                            ));
                        }
                    }
                    targets.iter().cloned().collect()
                }
                None => layers[index + 1..].iter().map(|l| l.name.clone()).collect(),
            };
            allowed.insert(layer.name.clone());

            let patterns = layer
                .patterns
                .iter()
                .map(|p| Pattern::new(rule_id, p))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(CompiledLayer {
                name: layer.name.clone(),
                patterns,
                allowed,
            })
        })
        .collect()
}

/// A validated ontology shared read-only by analysis runs.
#[derive(Debug, Clone)]
pub struct CompiledOntology {
    source: Ontology,
    rules: Vec<CompiledRule>,
}

impl CompiledOntology {
    pub fn compile(source: Ontology) -> Result<Self, OntologyError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(source.rules.len());
        for spec in &source.rules {
            if spec.rule_id.trim().is_empty() {
                return Err(OntologyError::invalid("<unnamed>", "rule_id must not be empty"));
            }
            if baseline::is_baseline_rule(&spec.rule_id) {
                return Err(OntologyError::invalid(&spec.rule_id, "rule_id is reserved for baseline comparison"));
            }
            if !seen.insert(spec.rule_id.as_str()) {
                return Err(OntologyError::invalid(&spec.rule_id, "duplicate rule_id"));
            }
            rules.push(CompiledRule::compile(spec)?);
        }
        Ok(Self { source, rules })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, OntologyError> {
        Self::compile(Ontology::from_yaml(yaml)?)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn source(&self) -> &Ontology {
        &self.source
    }

    pub fn baseline(&self) -> &BaselineChecks {
        &self.source.baseline
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
