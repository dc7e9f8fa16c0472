//! Evaluation of a code graph against an ontology.
//!
//! Each rule family lives in its own module and reports [`Hit`]s; hits for
//! the same rule and component are folded into a single [`Violation`].
//! [`baseline`] adds fixed rules comparing the graph with the previous
//! version of the project.

pub mod baseline;
mod cycles;
mod forbidden;
mod layers;
mod surface;
mod violation;

pub use baseline::Baseline;
pub use violation::{sort_violations, Severity, Violation};

use crate::graph::{CodeEdge, CodeGraph, CodeNode};
use crate::ontology::{BaselineChecks, CompiledOntology, CompiledRule, RuleCheck};
use std::collections::BTreeMap;
use tracing::debug;

/// A single observation produced by a rule check.
#[derive(Debug, Clone)]
pub(crate) struct Hit {
    pub component: String,
    pub expected: String,
    pub instance: String,
    pub explanation: String,
    pub suggested_fix: String,
}

/// Folds hits into violations keyed by (rule, component).
#[derive(Default)]
struct Merger {
    merged: BTreeMap<(String, String), Violation>,
}

impl Merger {
    fn add(&mut self, rule_id: &str, severity: Severity, rule: Option<&CompiledRule>, hit: Hit) {
        let key = (rule_id.to_string(), hit.component.clone());
        let entry = self.merged.entry(key).or_insert_with(|| Violation {
            id: Violation::id_for(rule_id, &hit.component),
            rule_id: rule_id.to_string(),
            severity,
            component: hit.component.clone(),
            expected: hit.expected.clone(),
            actual: Vec::new(),
            explanation: rule
                .and_then(|r| r.explanation.clone())
                .unwrap_or_else(|| hit.explanation.clone()),
            suggested_fix: rule
                .and_then(|r| r.suggested_fix.clone())
                .unwrap_or_else(|| hit.suggested_fix.clone()),
        });
        if !entry.actual.contains(&hit.instance) {
            entry.actual.push(hit.instance);
        }
    }

    fn finish(self) -> Vec<Violation> {
        let mut violations: Vec<Violation> = self
            .merged
            .into_values()
            .map(|mut v| {
                v.actual.sort();
                v
            })
            .collect();
        sort_violations(&mut violations);
        violations
    }
}

fn apply_rules(merger: &mut Merger, graph: &CodeGraph, ontology: &CompiledOntology) {
    for rule in ontology.rules() {
        let view = RuleView::new(graph, rule);
        let hits = match &rule.check {
            RuleCheck::ForbiddenEdge { source, target } => forbidden::check(&view, source, target),
            RuleCheck::NoCycle => cycles::check(&view),
            RuleCheck::LayerOrder { layers } => layers::check(&view, layers),
            RuleCheck::AllowedExportSurface { allowed } => surface::check(&view, allowed),
        };
        debug!(rule = %rule.rule_id, hits = hits.len(), "Rule evaluated");

        for hit in hits {
            merger.add(&rule.rule_id, rule.severity, Some(rule), hit);
        }
    }
}

fn apply_baseline(merger: &mut Merger, graph: &CodeGraph, baseline: &Baseline<'_>, checks: &BaselineChecks) {
    let findings = baseline::check(baseline, graph, checks);
    debug!(since = %baseline.commit_hash, findings = findings.len(), "Baseline compared");
    for finding in findings {
        merger.add(finding.rule_id, finding.severity, None, finding.hit);
    }
}

/// Evaluate every rule of `ontology` against `graph`.
///
/// The result is sorted by severity, rule id and component, and is a pure
/// function of its inputs.
pub fn detect(graph: &CodeGraph, ontology: &CompiledOntology) -> Vec<Violation> {
    let mut merger = Merger::default();
    apply_rules(&mut merger, graph, ontology);
    merger.finish()
}

/// Ontology rules plus, when a previous version exists, the baseline
/// checks the ontology enables, merged into one sorted list.
pub fn evaluate(graph: &CodeGraph, ontology: &CompiledOntology, baseline: Option<&Baseline<'_>>) -> Vec<Violation> {
    let mut merger = Merger::default();
    apply_rules(&mut merger, graph, ontology);
    if let Some(baseline) = baseline.filter(|_| ontology.baseline().any()) {
        apply_baseline(&mut merger, graph, baseline, ontology.baseline());
    }
    merger.finish()
}

/// The part of the graph a rule is allowed to see.
pub(crate) struct RuleView<'a> {
    graph: &'a CodeGraph,
    rule: &'a CompiledRule,
}

impl<'a> RuleView<'a> {
    fn new(graph: &'a CodeGraph, rule: &'a CompiledRule) -> Self {
        Self { graph, rule }
    }

    pub fn rule(&self) -> &'a CompiledRule {
        self.rule
    }

    pub fn admits(&self, node: &CodeNode) -> bool {
        (self.rule.include_external || !node.is_external()) && self.rule.scope.contains(&node.name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &'a CodeNode> + '_ {
        self.graph.nodes().filter(move |n| self.admits(n))
    }

    /// Edges of the inspected kinds whose endpoints are both in scope.
    pub fn edges(&self) -> impl Iterator<Item = (&'a CodeEdge, &'a CodeNode, &'a CodeNode)> + '_ {
        self.graph.edges().filter_map(move |edge| {
            if !self.rule.inspects(edge.kind) {
                return None;
            }
            let source = self.graph.node(&edge.source)?;
            let target = self.graph.node(&edge.target)?;
            (self.admits(source) && self.admits(target)).then_some((edge, source, target))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::module_graph;
    use super::*;

    const RULES: &str = r#"
rules:
  - rule_id: acyclic
    kind: no_cycle
    severity: low
  - rule_id: gateway-isolation
    kind: forbidden_edge
    severity: critical
    source: "gateway.*"
    target: "firmware.*"
"#;

    #[test]
    fn test_ordering_by_severity_then_rule() {
        let graph = module_graph(
            &["gateway_module", "firmware_core", "a", "b"],
            &[("gateway_module", "firmware_core"), ("a", "b"), ("b", "a")],
        );
        let ontology = CompiledOntology::from_yaml(RULES).unwrap();
        let violations = detect(&graph, &ontology);

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule_id, "gateway-isolation");
        assert_eq!(violations[0].severity, Severity::Critical);
        assert_eq!(violations[1].rule_id, "acyclic");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let graph = module_graph(
            &["gateway.a", "gateway.b", "firmware.x"],
            &[("gateway.a", "firmware.x"), ("gateway.b", "firmware.x")],
        );
        let ontology = CompiledOntology::from_yaml(RULES).unwrap();
        assert_eq!(detect(&graph, &ontology), detect(&graph, &ontology));
    }

    #[test]
    fn test_empty_ontology_yields_nothing() {
        let graph = module_graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let ontology = CompiledOntology::from_yaml("rules: []").unwrap();
        assert!(detect(&graph, &ontology).is_empty());
    }

    #[test]
    fn test_rule_text_overrides_defaults() {
        let yaml = r#"
rules:
  - rule_id: no-ui-db
    kind: forbidden_edge
    source: "ui\\..*"
    target: "db\\..*"
    explanation: "UI must go through services"
    suggested_fix: "Call a service instead"
"#;
        let graph = module_graph(&["ui.page", "db.conn"], &[("ui.page", "db.conn")]);
        let ontology = CompiledOntology::from_yaml(yaml).unwrap();
        let violations = detect(&graph, &ontology);
        assert_eq!(violations[0].explanation, "UI must go through services");
        assert_eq!(violations[0].suggested_fix, "Call a service instead");
    }
}
