//! Language-agnostic code graph.
//!
//! A [`CodeGraph`] is the structural model of one snapshot: modules, classes,
//! functions and API endpoints as nodes, connected by IMPORTS, CALLS,
//! INHERITS and EXPOSES edges. It is produced once per analysis run by the
//! extractor and then shared read-only by the renderer, the drift detector
//! and the summarizer.
//!
//! ## Invariants
//!
//! - Node ids are unique (`"{kind}:{qualified name}"`).
//! - Every edge references two nodes present in the graph.
//! - Nodes and edges are kept in ordered collections, so iteration order is
//!   stable and two graphs built from the same files compare equal.

mod builder;
mod digest;

pub use builder::GraphBuilder;
pub use digest::{GraphDelta, GraphDigest};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute marking a module node that only exists as an import target.
pub const ATTR_EXTERNAL: &str = "external";
/// HTTP method of an endpoint node.
pub const ATTR_METHOD: &str = "method";
/// Route path of an endpoint node.
pub const ATTR_PATH: &str = "path";
/// Routing framework that declared an endpoint.
pub const ATTR_FRAMEWORK: &str = "framework";
/// Handler expression bound to an endpoint.
pub const ATTR_HANDLER: &str = "handler";

/// Kind of a code entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Class,
    Function,
    Endpoint,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [Self::Module, Self::Class, Self::Function, Self::Endpoint];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Endpoint => "endpoint",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Module A imports module B.
    Imports,
    /// Function or class A calls function/constructor B.
    Calls,
    /// Class A inherits from / implements class B.
    Inherits,
    /// Module A exposes endpoint B.
    Exposes,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 4] = [Self::Imports, Self::Calls, Self::Inherits, Self::Exposes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::Inherits => "inherits",
            Self::Exposes => "exposes",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of an entity, normalised across languages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Where an entity is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Path relative to the snapshot root, `/`-separated.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// A code entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: String,
    pub kind: NodeKind,
    /// Qualified, dot-separated name (`billing.service.Invoice.total`).
    pub name: String,
    /// Name of the module that declares this entity.
    pub module: String,
    pub language: String,
    pub location: SourceLocation,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl CodeNode {
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        module: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        let name = name.into();
        Self {
            id: Self::node_id(kind, &name),
            kind,
            name,
            module: module.into(),
            language: String::new(),
            location,
            visibility: Visibility::Public,
            attributes: BTreeMap::new(),
        }
    }

    /// Build an endpoint node for a route declaration.
    pub fn endpoint(
        method: &str,
        path: &str,
        module: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        let method = method.to_ascii_uppercase();
        let name = format!("{} {}", method, path);
        Self::new(NodeKind::Endpoint, name, module, location)
            .with_attribute(ATTR_METHOD, method)
            .with_attribute(ATTR_PATH, path)
    }

    /// Id of the node with the given kind and qualified name.
    pub fn node_id(kind: NodeKind, name: &str) -> String {
        format!("{}:{}", kind.as_str(), name)
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// True for module nodes that stand in for imports outside the snapshot.
    pub fn is_external(&self) -> bool {
        self.attribute(ATTR_EXTERNAL) == Some("true")
    }

    /// Last segment of the qualified name.
    pub fn simple_name(&self) -> &str {
        if self.kind == NodeKind::Endpoint {
            return &self.name;
        }
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Key used by digests: stable across runs, independent of location.
    pub fn key(&self) -> String {
        self.id.clone()
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeEdge {
    pub kind: EdgeKind,
    pub source: String,
    pub target: String,
}

impl CodeEdge {
    pub fn new(kind: EdgeKind, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.kind.as_str(), self.source, self.target)
    }
}

/// A file that could not be turned into nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub reason: String,
}

/// A call or base-class reference the builder could not match to a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnresolvedReference {
    /// Id of the referencing node.
    pub from: String,
    /// Name as written at the reference site.
    pub name: String,
    pub kind: EdgeKind,
}

impl UnresolvedReference {
    /// Last segment of the written name.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit(['.', ':']).next().unwrap_or(&self.name)
    }
}

/// Bookkeeping from the extraction pass that produced a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub files_parsed: usize,
    pub failures: Vec<FileFailure>,
    /// Symbol references (calls, base classes) with no matching node.
    pub unresolved_references: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedReference>,
    /// Parsed file count per language.
    pub languages: BTreeMap<String, usize>,
}

/// Counts describing a graph, persisted with every version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub external_modules: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub unresolved_references: usize,
    pub languages: BTreeMap<String, usize>,
}

impl GraphStats {
    pub fn nodes(&self, kind: NodeKind) -> usize {
        self.nodes_by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }

    pub fn edges(&self, kind: EdgeKind) -> usize {
        self.edges_by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }
}

/// One entry of the endpoint inventory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub method: String,
    pub path: String,
    pub handler: String,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub framework: String,
}

/// The structural model of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeGraph {
    nodes: BTreeMap<String, CodeNode>,
    edges: BTreeSet<CodeEdge>,
    report: ExtractionReport,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Returns `false` (and keeps the existing node) when the
    /// id is already taken.
    pub fn add_node(&mut self, node: CodeNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Insert an edge. Returns `false` when either endpoint is missing or
    /// the edge already exists.
    pub fn add_edge(&mut self, edge: CodeEdge) -> bool {
        if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
            return false;
        }
        self.edges.insert(edge)
    }

    pub fn node(&self, id: &str) -> Option<&CodeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CodeNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CodeEdge> {
        self.edges.iter()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &CodeNode> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &CodeEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of the modules defined inside the snapshot.
    pub fn internal_modules(&self) -> impl Iterator<Item = &CodeNode> {
        self.nodes_of_kind(NodeKind::Module).filter(|n| !n.is_external())
    }

    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }

    pub fn set_report(&mut self, report: ExtractionReport) {
        self.report = report;
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            files_parsed: self.report.files_parsed,
            files_failed: self.report.failures.len(),
            unresolved_references: self.report.unresolved_references,
            languages: self.report.languages.clone(),
            ..Default::default()
        };
        for node in self.nodes.values() {
            *stats.nodes_by_kind.entry(node.kind.as_str().to_string()).or_default() += 1;
            if node.is_external() {
                stats.external_modules += 1;
            }
        }
        for edge in &self.edges {
            *stats.edges_by_kind.entry(edge.kind.as_str().to_string()).or_default() += 1;
        }
        stats
    }

    /// Endpoint inventory, sorted by path then method.
    pub fn endpoints(&self) -> Vec<EndpointRecord> {
        let mut endpoints: Vec<EndpointRecord> = self
            .nodes_of_kind(NodeKind::Endpoint)
            .map(|n| EndpointRecord {
                method: n.attribute(ATTR_METHOD).unwrap_or("ANY").to_string(),
                path: n.attribute(ATTR_PATH).unwrap_or("/").to_string(),
                handler: n.attribute(ATTR_HANDLER).unwrap_or_default().to_string(),
                module: n.module.clone(),
                file: n.location.file.clone(),
                line: n.location.line,
                framework: n.attribute(ATTR_FRAMEWORK).unwrap_or_default().to_string(),
            })
            .collect();
        endpoints.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
        endpoints
    }

    /// Fingerprint of this graph's node and edge sets.
    pub fn digest(&self) -> GraphDigest {
        GraphDigest::from_graph(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> CodeNode {
        CodeNode::new(NodeKind::Module, name, name, SourceLocation::new(format!("{name}.py"), 1))
    }

    #[test]
    fn test_edges_require_existing_nodes() {
        let mut graph = CodeGraph::new();
        graph.add_node(module("a"));

        assert!(!graph.add_edge(CodeEdge::new(EdgeKind::Imports, "module:a", "module:b")));

        graph.add_node(module("b"));
        assert!(graph.add_edge(CodeEdge::new(EdgeKind::Imports, "module:a", "module:b")));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_duplicate_node_keeps_first() {
        let mut graph = CodeGraph::new();
        assert!(graph.add_node(module("a")));

        let mut other = module("a");
        other.location.line = 42;
        assert!(!graph.add_node(other));
        assert_eq!(graph.node("module:a").unwrap().location.line, 1);
    }

    #[test]
    fn test_endpoint_node_attributes() {
        let node = CodeNode::endpoint("get", "/users", "api", SourceLocation::new("api.py", 3));
        assert_eq!(node.id, "endpoint:GET /users");
        assert_eq!(node.attribute(ATTR_METHOD), Some("GET"));
        assert_eq!(node.simple_name(), "GET /users");
    }

    #[test]
    fn test_stats_count_by_kind() {
        let mut graph = CodeGraph::new();
        graph.add_node(module("a"));
        graph.add_node(module("b").with_attribute(ATTR_EXTERNAL, "true"));
        graph.add_edge(CodeEdge::new(EdgeKind::Imports, "module:a", "module:b"));

        let stats = graph.stats();
        assert_eq!(stats.nodes(NodeKind::Module), 2);
        assert_eq!(stats.edges(EdgeKind::Imports), 1);
        assert_eq!(stats.external_modules, 1);
    }
}
