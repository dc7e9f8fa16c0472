//! Typed views of a code graph, emitted as DOT.

use super::dot::{escape_record, DotBuilder};
use super::DiagramType;
use crate::graph::{CodeGraph, CodeNode, EdgeKind, NodeKind, ATTR_HANDLER, ATTR_METHOD, ATTR_PATH};
use std::collections::{BTreeMap, BTreeSet};

/// One diagram ready for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub diagram_type: DiagramType,
    /// Module name for per-module diagrams.
    pub subject: Option<String>,
    pub description: String,
    pub dot: String,
}

impl Projection {
    fn global(diagram_type: DiagramType, dot: String) -> Self {
        Self {
            diagram_type,
            subject: None,
            description: diagram_type.description().to_string(),
            dot,
        }
    }
}

/// All projections of `diagram_type`. Global types always produce exactly
/// one projection; `class_module` produces one per module with classes.
pub fn project(graph: &CodeGraph, diagram_type: DiagramType) -> Vec<Projection> {
    match diagram_type {
        DiagramType::ClassGlobal => {
            let classes: Vec<&CodeNode> = graph.nodes_of_kind(NodeKind::Class).collect();
            vec![Projection::global(diagram_type, class_dot(graph, &classes, true, "No Classes Found"))]
        }
        DiagramType::ClassModule => {
            let mut by_module: BTreeMap<&str, Vec<&CodeNode>> = BTreeMap::new();
            for class in graph.nodes_of_kind(NodeKind::Class) {
                by_module.entry(class.module.as_str()).or_default().push(class);
            }
            by_module
                .into_iter()
                .map(|(module, classes)| Projection {
                    diagram_type,
                    subject: Some(module.to_string()),
                    description: format!("Class Diagram: {module}"),
                    dot: class_dot(graph, &classes, false, "No Classes Found"),
                })
                .collect()
        }
        DiagramType::Dependency => vec![Projection::global(diagram_type, dependency_dot(graph))],
        DiagramType::Call => vec![Projection::global(diagram_type, call_dot(graph))],
        DiagramType::Api => vec![Projection::global(diagram_type, api_dot(graph))],
    }
}

/// Method names declared directly on each class.
fn methods_by_class(graph: &CodeGraph) -> BTreeMap<&str, Vec<&str>> {
    let mut methods: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for function in graph.nodes_of_kind(NodeKind::Function) {
        if let Some((owner, method)) = function.name.rsplit_once('.') {
            if graph.contains(&CodeNode::node_id(NodeKind::Class, owner)) {
                methods.entry(owner).or_default().push(method);
            }
        }
    }
    for list in methods.values_mut() {
        list.sort_unstable();
    }
    methods
}

fn class_dot(graph: &CodeGraph, classes: &[&CodeNode], qualified: bool, empty: &str) -> String {
    let mut dot = DotBuilder::digraph("TB");
    if classes.is_empty() {
        dot.placeholder(empty);
        return dot.finish();
    }

    let methods = methods_by_class(graph);
    let shown: BTreeSet<&str> = classes.iter().map(|c| c.id.as_str()).collect();
    for class in classes {
        let title = if qualified { class.name.as_str() } else { class.simple_name() };
        let body: String = methods
            .get(class.name.as_str())
            .map(|list| list.iter().map(|m| format!("{}()\\l", escape_record(m))).collect())
            .unwrap_or_default();
        dot.record(&class.id, &format!("{{{}|{}}}", escape_record(title), body));
    }

    let mut outside = BTreeSet::new();
    for edge in graph.edges_of_kind(EdgeKind::Inherits) {
        if !shown.contains(edge.source.as_str()) {
            continue;
        }
        if !shown.contains(edge.target.as_str()) {
            if qualified {
                continue;
            }
            outside.insert(edge.target.as_str());
        }
        dot.edge(&edge.source, &edge.target, &[("arrowhead", "empty")]);
    }
    for id in outside {
        let label = graph.node(id).map(|n| n.name.as_str()).unwrap_or(id);
        dot.node(id, &[("label", label), ("shape", "box"), ("style", "dashed")]);
    }
    dot.finish()
}

fn dependency_dot(graph: &CodeGraph) -> String {
    let mut dot = DotBuilder::digraph("LR");
    let imports: Vec<_> = graph.edges_of_kind(EdgeKind::Imports).collect();
    if imports.is_empty() {
        dot.placeholder("No Dependencies Found");
        return dot.finish();
    }

    let mut used = BTreeSet::new();
    for edge in &imports {
        used.insert(edge.source.as_str());
        used.insert(edge.target.as_str());
    }
    for id in used {
        let Some(module) = graph.node(id) else { continue };
        if module.is_external() {
            dot.node(id, &[("label", module.name.as_str()), ("shape", "box"), ("style", "dashed")]);
        } else {
            dot.node(id, &[("label", module.name.as_str()), ("shape", "box")]);
        }
    }
    for edge in imports {
        dot.edge(&edge.source, &edge.target, &[]);
    }
    dot.finish()
}

fn call_dot(graph: &CodeGraph) -> String {
    let mut dot = DotBuilder::digraph("LR");
    let calls: Vec<_> = graph.edges_of_kind(EdgeKind::Calls).collect();
    if calls.is_empty() {
        dot.placeholder("No Calls Found");
        return dot.finish();
    }

    let mut by_module: BTreeMap<&str, BTreeMap<&str, &CodeNode>> = BTreeMap::new();
    for edge in &calls {
        for id in [&edge.source, &edge.target] {
            if let Some(node) = graph.node(id) {
                by_module
                    .entry(node.module.as_str())
                    .or_default()
                    .insert(node.id.as_str(), node);
            }
        }
    }
    for (module, nodes) in by_module {
        dot.open_cluster(module, module);
        for node in nodes.into_values() {
            let shape = if node.kind == NodeKind::Class { "box" } else { "ellipse" };
            dot.node(&node.id, &[("label", node.simple_name()), ("shape", shape)]);
        }
        dot.close_cluster();
    }
    for edge in calls {
        dot.edge(&edge.source, &edge.target, &[("style", "solid")]);
    }
    dot.finish()
}

fn api_dot(graph: &CodeGraph) -> String {
    let mut dot = DotBuilder::digraph("LR");
    let mut by_module: BTreeMap<&str, Vec<&CodeNode>> = BTreeMap::new();
    for edge in graph.edges_of_kind(EdgeKind::Exposes) {
        if let (Some(module), Some(endpoint)) = (graph.node(&edge.source), graph.node(&edge.target)) {
            by_module.entry(module.name.as_str()).or_default().push(endpoint);
        }
    }
    if by_module.is_empty() {
        dot.placeholder("No Endpoints Found");
        return dot.finish();
    }

    for (module, mut endpoints) in by_module {
        endpoints.sort_by(|a, b| {
            (a.attribute(ATTR_PATH), a.attribute(ATTR_METHOD))
                .cmp(&(b.attribute(ATTR_PATH), b.attribute(ATTR_METHOD)))
        });
        let rows: Vec<String> = endpoints
            .iter()
            .map(|ep| {
                format!(
                    "{{{}|{}|{}}}",
                    escape_record(ep.attribute(ATTR_METHOD).unwrap_or("ANY")),
                    escape_record(ep.attribute(ATTR_PATH).unwrap_or("/")),
                    escape_record(ep.attribute(ATTR_HANDLER).unwrap_or_default()),
                )
            })
            .collect();
        let label = format!("{{{}|{{{}}}}}", escape_record(module), rows.join("|"));
        dot.record(&CodeNode::node_id(NodeKind::Module, module), &label);
    }
    dot.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CodeEdge, SourceLocation};

    fn sample() -> CodeGraph {
        let loc = SourceLocation::new("shop/models.py", 1);
        let mut graph = CodeGraph::new();
        for module in ["shop.models", "shop.views"] {
            graph.add_node(CodeNode::new(NodeKind::Module, module, module, loc.clone()));
        }
        graph.add_node(CodeNode::new(NodeKind::Class, "shop.models.Base", "shop.models", loc.clone()));
        graph.add_node(CodeNode::new(NodeKind::Class, "shop.models.Order", "shop.models", loc.clone()));
        graph.add_node(CodeNode::new(NodeKind::Function, "shop.models.Order.total", "shop.models", loc.clone()));
        graph.add_node(CodeNode::new(NodeKind::Function, "shop.views.checkout", "shop.views", loc.clone()));
        graph.add_node(
            CodeNode::endpoint("POST", "/checkout", "shop.views", loc).with_attribute(ATTR_HANDLER, "checkout"),
        );
        graph.add_edge(CodeEdge::new(EdgeKind::Inherits, "class:shop.models.Order", "class:shop.models.Base"));
        graph.add_edge(CodeEdge::new(EdgeKind::Imports, "module:shop.views", "module:shop.models"));
        graph.add_edge(CodeEdge::new(EdgeKind::Calls, "function:shop.views.checkout", "function:shop.models.Order.total"));
        graph.add_edge(CodeEdge::new(EdgeKind::Exposes, "module:shop.views", "endpoint:POST /checkout"));
        graph
    }

    #[test]
    fn test_global_class_diagram() {
        let projections = project(&sample(), DiagramType::ClassGlobal);
        assert_eq!(projections.len(), 1);
        let dot = &projections[0].dot;
        assert!(dot.contains("label=\"{shop.models.Order|total()\\l}\""));
        assert!(dot.contains("\"class:shop.models.Order\" -> \"class:shop.models.Base\" [arrowhead=\"empty\"]"));
        assert_eq!(projections[0].description, "Global Class Diagram");
    }

    #[test]
    fn test_class_module_partitioned() {
        let projections = project(&sample(), DiagramType::ClassModule);
        assert_eq!(projections.len(), 1);
        assert_eq!(projections[0].subject.as_deref(), Some("shop.models"));
        assert_eq!(projections[0].description, "Class Diagram: shop.models");
        assert!(projections[0].dot.contains("{Order|total()\\l}"));
    }

    #[test]
    fn test_api_groups_by_module() {
        let projections = project(&sample(), DiagramType::Api);
        assert!(projections[0].dot.contains("{shop.views|{{POST|/checkout|checkout}}}"));
    }

    #[test]
    fn test_empty_graph_gets_placeholders() {
        let graph = CodeGraph::new();
        for kind in [DiagramType::ClassGlobal, DiagramType::Dependency, DiagramType::Call, DiagramType::Api] {
            let projections = project(&graph, kind);
            assert_eq!(projections.len(), 1);
            assert!(projections[0].dot.contains("shape=\"plaintext\""));
        }
        assert!(project(&graph, DiagramType::ClassModule).is_empty());
    }

    #[test]
    fn test_call_diagram_clusters_modules() {
        let dot = &project(&sample(), DiagramType::Call)[0].dot;
        assert!(dot.contains("subgraph \"cluster_shop.models\""));
        assert!(dot.contains("\"function:shop.views.checkout\" -> \"function:shop.models.Order.total\""));
    }
}
