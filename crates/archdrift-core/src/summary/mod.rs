//! README and change-summary text for a version.

mod delta;

pub use delta::ViolationDelta;

use crate::drift::Violation;
use crate::graph::{CodeGraph, GraphDelta, NodeKind};
use crate::version::{short_hash, DiagramVersion, DriftStatus};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Longest list printed before eliding the rest.
const LIST_LIMIT: usize = 20;

/// Generated prose for one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryText {
    pub readme: String,
    pub summary: String,
}

/// Describe `graph`, relative to `previous` when there is one.
///
/// Never fails: a section that cannot be written comes out empty.
pub fn summarize(
    graph: &CodeGraph,
    previous: Option<&DiagramVersion>,
    violations: &[Violation],
    drift: &DriftStatus,
) -> SummaryText {
    SummaryText {
        readme: readme(graph).unwrap_or_default(),
        summary: summary(graph, previous, violations, drift).unwrap_or_default(),
    }
}

fn push_list(out: &mut String, items: &[&str]) -> std::fmt::Result {
    for item in items.iter().take(LIST_LIMIT) {
        writeln!(out, "- `{item}`")?;
    }
    if items.len() > LIST_LIMIT {
        writeln!(out, "- and {} more", items.len() - LIST_LIMIT)?;
    }
    Ok(())
}

pub(crate) fn nouns(noun: &str) -> String {
    if noun.ends_with('s') {
        format!("{noun}es")
    } else {
        format!("{noun}s")
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {}", nouns(noun))
    }
}

fn readme(graph: &CodeGraph) -> Result<String, std::fmt::Error> {
    let stats = graph.stats();
    let mut out = String::new();

    writeln!(out, "# Architecture Overview\n")?;
    writeln!(
        out,
        "{}, {}, {} and {} across {}.\n",
        plural(graph.internal_modules().count(), "module"),
        plural(stats.nodes(NodeKind::Class), "class"),
        plural(stats.nodes(NodeKind::Function), "function"),
        plural(stats.nodes(NodeKind::Endpoint), "endpoint"),
        plural(stats.files_parsed, "file")
    )?;

    if !stats.languages.is_empty() {
        writeln!(out, "## Languages\n")?;
        writeln!(out, "| Language | Files |")?;
        writeln!(out, "|----------|-------|")?;
        for (language, files) in &stats.languages {
            writeln!(out, "| {language} | {files} |")?;
        }
        writeln!(out)?;
    }

    let modules: Vec<&str> = graph.internal_modules().map(|m| m.name.as_str()).collect();
    if !modules.is_empty() {
        writeln!(out, "## Modules\n")?;
        push_list(&mut out, &modules)?;
        writeln!(out)?;
    }

    let mut classes: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for class in graph.nodes_of_kind(NodeKind::Class) {
        classes.entry(class.module.as_str()).or_default().push(class.simple_name());
    }
    if !classes.is_empty() {
        writeln!(out, "## Classes\n")?;
        for (module, names) in &classes {
            writeln!(out, "### {module}\n")?;
            push_list(&mut out, names)?;
            writeln!(out)?;
        }
    }

    let endpoints = graph.endpoints();
    if !endpoints.is_empty() {
        writeln!(out, "## API Endpoints\n")?;
        writeln!(out, "| Method | Path | Handler | Module |")?;
        writeln!(out, "|--------|------|---------|--------|")?;
        for ep in &endpoints {
            writeln!(out, "| {} | `{}` | {} | {} |", ep.method, ep.path, ep.handler, ep.module)?;
        }
        writeln!(out)?;
    }

    let external: Vec<&str> = graph
        .nodes_of_kind(NodeKind::Module)
        .filter(|m| m.is_external())
        .map(|m| m.name.as_str())
        .collect();
    if !external.is_empty() {
        writeln!(out, "## External Dependencies\n")?;
        push_list(&mut out, &external)?;
        writeln!(out)?;
    }

    Ok(out.trim_end().to_string() + "\n")
}

fn summary(
    graph: &CodeGraph,
    previous: Option<&DiagramVersion>,
    violations: &[Violation],
    drift: &DriftStatus,
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# Summary\n")?;

    let Some(previous) = previous else {
        let stats = graph.stats();
        writeln!(
            out,
            "Baseline analysis: {}, {}, {} and {}.\n",
            plural(graph.internal_modules().count(), "module"),
            plural(stats.nodes(NodeKind::Class), "class"),
            plural(stats.nodes(NodeKind::Function), "function"),
            plural(stats.nodes(NodeKind::Endpoint), "endpoint")
        )?;
        drift_section(&mut out, drift, violations, None)?;
        return Ok(out);
    };

    let delta = graph.digest().delta_from(&previous.graph_digest);
    let base = short_hash(&previous.commit_hash);
    if delta.is_empty() {
        writeln!(out, "No structural changes since `{base}`.\n")?;
    } else {
        writeln!(
            out,
            "Since `{base}`: {} added and {} removed, {} added and {} removed.\n",
            plural(delta.added_nodes.len(), "node"),
            delta.removed_nodes.len(),
            plural(delta.added_edges.len(), "edge"),
            delta.removed_edges.len()
        )?;
        structure_section(&mut out, &delta)?;
    }

    let comparable = previous.completeness.drift.is_evaluated();
    drift_section(&mut out, drift, violations, comparable.then_some(previous.violations.as_slice()))?;
    Ok(out)
}

fn structure_section(out: &mut String, delta: &GraphDelta) -> std::fmt::Result {
    writeln!(out, "## Structural Changes\n")?;
    for kind in NodeKind::ALL {
        for (label, names) in [("Added", delta.added(kind)), ("Removed", delta.removed(kind))] {
            if names.is_empty() {
                continue;
            }
            writeln!(out, "### {label} {}\n", nouns(kind.as_str()))?;
            push_list(out, &names)?;
            writeln!(out)?;
        }
    }

    let mut edge_counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for key in &delta.added_edges {
        edge_counts.entry(edge_kind(key)).or_default().0 += 1;
    }
    for key in &delta.removed_edges {
        edge_counts.entry(edge_kind(key)).or_default().1 += 1;
    }
    if !edge_counts.is_empty() {
        writeln!(out, "### Relationships\n")?;
        for (kind, (added, removed)) in edge_counts {
            writeln!(out, "- {kind}: +{added} / -{removed}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn edge_kind(key: &str) -> &str {
    key.split('|').next().unwrap_or(key)
}

fn drift_section(
    out: &mut String,
    drift: &DriftStatus,
    violations: &[Violation],
    previous: Option<&[Violation]>,
) -> std::fmt::Result {
    writeln!(out, "## Drift\n")?;
    if let DriftStatus::Unevaluated { reason } = drift {
        writeln!(out, "Drift was not evaluated: {reason}.")?;
        return Ok(());
    }

    if violations.is_empty() {
        writeln!(out, "No architecture violations.")?;
    } else {
        writeln!(out, "{} in total.", plural(violations.len(), "violation"))?;
    }

    if let Some(previous) = previous {
        let delta = ViolationDelta::between(previous, violations);
        if delta.is_empty() {
            writeln!(out, "\nNo change in violations.")?;
        }
        for (title, list) in [("New violations", &delta.new), ("Resolved violations", &delta.resolved)] {
            if list.is_empty() {
                continue;
            }
            writeln!(out, "\n### {title}\n")?;
            for v in list.iter() {
                writeln!(out, "- [{}] {}: {}", v.severity, v.rule_id, v.component)?;
            }
        }
    } else if !violations.is_empty() {
        writeln!(out)?;
        for v in violations {
            writeln!(out, "- [{}] {}: {}", v.severity, v.rule_id, v.component)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::Severity;
    use crate::graph::{CodeEdge, CodeNode, EdgeKind, SourceLocation};
    use crate::version::{Completeness, TriggerSource};

    fn graph(modules: &[&str]) -> CodeGraph {
        let mut graph = CodeGraph::new();
        for m in modules {
            graph.add_node(CodeNode::new(NodeKind::Module, *m, *m, SourceLocation::new(format!("{m}.py"), 1)));
        }
        graph
    }

    fn previous_version(graph: &CodeGraph, violations: Vec<Violation>) -> DiagramVersion {
        DiagramVersion {
            id: "v1".into(),
            project_id: "p".into(),
            sequence: 1,
            commit_hash: "1111111aaaa".into(),
            commit_message: String::new(),
            author: String::new(),
            branch: None,
            trigger_source: TriggerSource::Manual,
            created_at: chrono::Utc::now(),
            readme_content: String::new(),
            summary_content: String::new(),
            images: vec![],
            violations,
            superseded: false,
            graph_stats: graph.stats(),
            graph_digest: graph.digest(),
            endpoints: vec![],
            completeness: Completeness::default(),
        }
    }

    fn violation(rule: &str, component: &str) -> Violation {
        Violation {
            id: Violation::id_for(rule, component),
            rule_id: rule.into(),
            severity: Severity::Critical,
            component: component.into(),
            expected: String::new(),
            actual: vec![],
            explanation: String::new(),
            suggested_fix: String::new(),
        }
    }

    #[test]
    fn test_baseline_summary() {
        let text = summarize(&graph(&["a", "b"]), None, &[], &DriftStatus::Evaluated);
        assert!(text
            .summary
            .contains("Baseline analysis: 2 modules, 0 classes, 0 functions and 0 endpoints."));
        assert!(text.summary.contains("No architecture violations."));
        assert!(text.readme.contains("## Modules"));
        assert!(text.readme.contains("- `a`"));
    }

    #[test]
    fn test_delta_summary() {
        let before = graph(&["a", "b"]);
        let mut after = graph(&["a", "c"]);
        after.add_edge(CodeEdge::new(EdgeKind::Imports, "module:a", "module:c"));
        let previous = previous_version(&before, vec![violation("r", "b")]);

        let text = summarize(&after, Some(&previous), &[violation("r", "c")], &DriftStatus::Evaluated);
        assert!(text.summary.contains("Since `1111111`"));
        assert!(text.summary.contains("### Added modules\n\n- `c`"));
        assert!(text.summary.contains("### Removed modules\n\n- `b`"));
        assert!(text.summary.contains("- imports: +1 / -0"));
        assert!(text.summary.contains("### New violations\n\n- [CRITICAL] r: c"));
        assert!(text.summary.contains("### Resolved violations\n\n- [CRITICAL] r: b"));
    }

    #[test]
    fn test_unchanged_graph() {
        let g = graph(&["a"]);
        let previous = previous_version(&g, vec![]);
        let text = summarize(&g, Some(&previous), &[], &DriftStatus::Evaluated);
        assert!(text.summary.contains("No structural changes since `1111111`."));
        assert!(text.summary.contains("No change in violations."));
    }

    #[test]
    fn test_unevaluated_drift_is_stated() {
        let drift = DriftStatus::Unevaluated {
            reason: "no ontology configured".into(),
        };
        let text = summarize(&graph(&["a"]), None, &[], &drift);
        assert!(text.summary.contains("Drift was not evaluated: no ontology configured."));
    }
}
