//! Cross-file resolution: turns per-file parse results into one [`CodeGraph`].

use std::collections::BTreeMap;

use tracing::debug;

use super::{
    CodeEdge, CodeGraph, CodeNode, EdgeKind, ExtractionReport, FileFailure, NodeKind, SourceLocation,
    UnresolvedReference, ATTR_EXTERNAL,
};
use crate::extract::parser::{ParseResult, SymbolRef};

/// Receiver prefixes that say nothing about where a symbol lives.
const RECEIVERS: [&str; 5] = ["self", "this", "cls", "super", "Self"];

/// Accumulates parse results and failures, then resolves them into a graph.
///
/// Resolution rules:
/// - An import resolves to an internal module by exact name, then by a
///   unique module whose name ends with `.{import}`, then by the longest
///   module `M` such that the import ends with `.{M}`. Anything else becomes
///   an external module node.
/// - A symbol reference resolves to a class or function with the same last
///   name segment, preferring a match on the written qualifier, then the
///   referencing module, then a unique candidate anywhere. Unresolved
///   references are dropped, counted and listed in the report.
#[derive(Default)]
pub struct GraphBuilder {
    files: Vec<ParseResult>,
    failures: Vec<FileFailure>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, result: ParseResult) {
        self.files.push(result);
    }

    pub fn add_failure(&mut self, file: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(FileFailure {
            file: file.into(),
            reason: reason.into(),
        });
    }

    pub fn parsed_files(&self) -> usize {
        self.files.len()
    }

    pub fn build(mut self) -> CodeGraph {
        self.files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        self.failures.sort();

        let mut graph = CodeGraph::new();
        let mut report = ExtractionReport {
            files_parsed: self.files.len(),
            ..Default::default()
        };

        // Declarations first so every reference can see every file.
        for file in &self.files {
            *report.languages.entry(file.language.clone()).or_default() += 1;

            let module = CodeNode::new(
                NodeKind::Module,
                file.module.clone(),
                file.module.clone(),
                SourceLocation::new(file.file_path.clone(), 1),
            )
            .with_language(file.language.clone());
            graph.add_node(module);

            for node in &file.nodes {
                if !graph.add_node(node.clone()) {
                    debug!(id = %node.id, file = %file.file_path, "duplicate declaration ignored");
                }
            }
        }

        let resolver = Resolver::new(&graph);

        for file in &self.files {
            let module_id = file.module_id();

            for node in file.nodes.iter().filter(|n| n.kind == NodeKind::Endpoint) {
                graph.add_edge(CodeEdge::new(EdgeKind::Exposes, module_id.clone(), node.id.clone()));
            }

            for candidates in &file.imports {
                let target = candidates
                    .iter()
                    .find_map(|c| resolver.module(c))
                    .map(|name| CodeNode::node_id(NodeKind::Module, &name))
                    .unwrap_or_else(|| external_module(&mut graph, candidates));
                if target != module_id {
                    graph.add_edge(CodeEdge::new(EdgeKind::Imports, module_id.clone(), target));
                }
            }

            for reference in &file.references {
                if !graph.contains(&reference.from) {
                    continue;
                }
                match resolver.symbol(reference, &file.module) {
                    Some(target) if target != reference.from => {
                        graph.add_edge(CodeEdge::new(reference.kind, reference.from.clone(), target));
                    }
                    Some(_) => {}
                    None => {
                        report.unresolved_references += 1;
                        report.unresolved.push(UnresolvedReference {
                            from: reference.from.clone(),
                            name: reference.name.clone(),
                            kind: reference.kind,
                        });
                    }
                }
            }
        }

        report.failures = self.failures;
        graph.set_report(report);
        graph
    }
}

/// Create (or reuse) the external module node for an unresolved import.
fn external_module(graph: &mut CodeGraph, candidates: &[String]) -> String {
    // The last candidate is the most general name: the package, not the member.
    let name = candidates.last().cloned().unwrap_or_default();
    let node = CodeNode::new(NodeKind::Module, name.clone(), name, SourceLocation::default())
        .with_attribute(ATTR_EXTERNAL, "true");
    let id = node.id.clone();
    graph.add_node(node);
    id
}

/// Lookup tables built from the declared nodes.
struct Resolver {
    modules: Vec<String>,
    /// Last name segment -> (qualified name, module, kind, id).
    symbols: BTreeMap<String, Vec<Symbol>>,
}

struct Symbol {
    id: String,
    name: String,
    module: String,
    kind: NodeKind,
}

impl Resolver {
    fn new(graph: &CodeGraph) -> Self {
        let modules = graph.internal_modules().map(|n| n.name.clone()).collect();
        let mut symbols: BTreeMap<String, Vec<Symbol>> = BTreeMap::new();
        for node in graph.nodes() {
            if matches!(node.kind, NodeKind::Class | NodeKind::Function) {
                symbols.entry(node.simple_name().to_string()).or_default().push(Symbol {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    module: node.module.clone(),
                    kind: node.kind,
                });
            }
        }
        Self { modules, symbols }
    }

    fn module(&self, reference: &str) -> Option<String> {
        if self.modules.iter().any(|m| m == reference) {
            return Some(reference.to_string());
        }

        let dotted = format!(".{}", reference);
        let mut suffixed = self.modules.iter().filter(|m| m.ends_with(&dotted));
        if let (Some(only), None) = (suffixed.next(), suffixed.next()) {
            return Some(only.clone());
        }

        self.modules
            .iter()
            .filter(|m| reference.ends_with(&format!(".{}", m)))
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .cloned()
    }

    fn symbol(&self, reference: &SymbolRef, module: &str) -> Option<String> {
        let segments: Vec<&str> = reference
            .name
            .split('.')
            .filter(|s| !s.is_empty())
            .skip_while(|s| RECEIVERS.contains(s))
            .collect();
        let (simple, qualifier) = segments.split_last()?;

        let candidates: Vec<&Symbol> = self
            .symbols
            .get(*simple)
            .map(|all| {
                all.iter()
                    .filter(|s| match reference.kind {
                        EdgeKind::Inherits => s.kind == NodeKind::Class,
                        _ => true,
                    })
                    .collect()
            })
            .unwrap_or_default();
        if candidates.is_empty() {
            return None;
        }

        if !qualifier.is_empty() {
            let written = format!("{}.{}", qualifier.join("."), simple);
            let suffix = format!(".{}", written);
            let qualified: Vec<&Symbol> = candidates
                .iter()
                .copied()
                .filter(|s| s.name == written || s.name.ends_with(&suffix))
                .collect();
            if let Some(found) = unique_or_local(&qualified, module) {
                return Some(found);
            }
        }

        unique_or_local(&candidates, module)
    }
}

/// Prefer a single same-module candidate, then a single candidate overall.
fn unique_or_local(candidates: &[&Symbol], module: &str) -> Option<String> {
    let local: Vec<&&Symbol> = candidates.iter().filter(|s| s.module == module).collect();
    match (local.as_slice(), candidates) {
        ([only], _) => Some(only.id.clone()),
        (_, [only]) => Some(only.id.clone()),
        _ => None,
    }
}
