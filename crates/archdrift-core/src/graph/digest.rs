//! Persistable digests of a graph and the delta between two of them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{CodeGraph, NodeKind};

/// Sorted node and edge keys of a graph.
///
/// Stored with every analysed version so the next run can describe what
/// changed without keeping the graph itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDigest {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<String>,
}

impl GraphDigest {
    pub fn from_graph(graph: &CodeGraph) -> Self {
        Self {
            nodes: graph.nodes().map(|n| n.key()).collect(),
            edges: graph.edges().map(|e| e.key()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// What changed going from `previous` to `self`.
    pub fn delta_from(&self, previous: &GraphDigest) -> GraphDelta {
        GraphDelta {
            added_nodes: self.nodes.difference(&previous.nodes).cloned().collect(),
            removed_nodes: previous.nodes.difference(&self.nodes).cloned().collect(),
            added_edges: self.edges.difference(&previous.edges).cloned().collect(),
            removed_edges: previous.edges.difference(&self.edges).cloned().collect(),
        }
    }
}

/// Structural difference between two digests, keys in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDelta {
    pub added_nodes: Vec<String>,
    pub removed_nodes: Vec<String>,
    pub added_edges: Vec<String>,
    pub removed_edges: Vec<String>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }

    /// Added nodes of one kind, as qualified names.
    pub fn added(&self, kind: NodeKind) -> Vec<&str> {
        names_of_kind(&self.added_nodes, kind)
    }

    /// Removed nodes of one kind, as qualified names.
    pub fn removed(&self, kind: NodeKind) -> Vec<&str> {
        names_of_kind(&self.removed_nodes, kind)
    }
}

fn names_of_kind(keys: &[String], kind: NodeKind) -> Vec<&str> {
    let prefix = format!("{}:", kind.as_str());
    keys.iter().filter_map(|k| k.strip_prefix(prefix.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CodeEdge, CodeNode, EdgeKind, SourceLocation};

    fn graph(modules: &[&str], imports: &[(&str, &str)]) -> CodeGraph {
        let mut graph = CodeGraph::new();
        for m in modules {
            graph.add_node(CodeNode::new(NodeKind::Module, *m, *m, SourceLocation::new("x", 1)));
        }
        for (a, b) in imports {
            graph.add_edge(CodeEdge::new(EdgeKind::Imports, format!("module:{a}"), format!("module:{b}")));
        }
        graph
    }

    #[test]
    fn test_delta() {
        let before = graph(&["a", "b"], &[("a", "b")]).digest();
        let after = graph(&["a", "c"], &[("a", "c")]).digest();

        let delta = after.delta_from(&before);
        assert_eq!(delta.added(NodeKind::Module), vec!["c"]);
        assert_eq!(delta.removed(NodeKind::Module), vec!["b"]);
        assert_eq!(delta.added_edges, vec!["imports|module:a|module:c".to_string()]);
        assert_eq!(delta.removed_edges, vec!["imports|module:a|module:b".to_string()]);
    }

    #[test]
    fn test_digest_ignores_build_order() {
        let one = graph(&["a", "b"], &[("a", "b")]).digest();
        let two = graph(&["b", "a"], &[("a", "b")]).digest();
        assert_eq!(one, two);
        assert!(one.delta_from(&two).is_empty());
    }
}
