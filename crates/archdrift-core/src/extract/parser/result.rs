//! Per-file parse output.

use crate::graph::{CodeNode, EdgeKind, NodeKind, SourceLocation, Visibility, ATTR_FRAMEWORK, ATTR_HANDLER};

/// A reference to a symbol that may live in another file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    /// Id of the referencing node (a function, class or module).
    pub from: String,
    /// Name as written at the reference site, possibly dotted (`models.Invoice`).
    pub name: String,
    /// `Calls` or `Inherits`.
    pub kind: EdgeKind,
}

/// What one front-end found in one file.
///
/// Nodes carry fully qualified names. Imports and symbol references are left
/// unresolved; the graph builder matches them against the whole snapshot.
#[derive(Debug, Default)]
pub struct ParseResult {
    /// File path that was parsed.
    pub file_path: String,

    /// Language of the front-end that produced this result.
    pub language: String,

    /// Dotted name of the module this file defines.
    pub module: String,

    /// Classes, functions and endpoints declared in the file.
    pub nodes: Vec<CodeNode>,

    /// Imported modules. Each entry lists candidate names, most specific first.
    pub imports: Vec<Vec<String>>,

    /// Calls and base-class references.
    pub references: Vec<SymbolRef>,

    /// Parse warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl ParseResult {
    /// Create a new parse result for the given file.
    pub fn new(file_path: impl Into<String>, language: &str, module: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.to_string(),
            module: module.into(),
            ..Default::default()
        }
    }

    /// Id of this file's module node.
    pub fn module_id(&self) -> String {
        CodeNode::node_id(NodeKind::Module, &self.module)
    }

    /// Qualify a local name with this file's module.
    pub fn qualify(&self, name: &str) -> String {
        if self.module.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.module, name)
        }
    }

    fn location(&self, line: u32) -> SourceLocation {
        SourceLocation::new(self.file_path.clone(), line)
    }

    /// Add a class declared under `qualified_name`. Returns its node id.
    pub fn add_class(&mut self, qualified_name: String, line: u32, visibility: Visibility) -> String {
        let node = CodeNode::new(NodeKind::Class, qualified_name, self.module.clone(), self.location(line))
            .with_visibility(visibility)
            .with_language(self.language.clone());
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Add a function or method declared under `qualified_name`. Returns its node id.
    pub fn add_function(&mut self, qualified_name: String, line: u32, visibility: Visibility) -> String {
        let node = CodeNode::new(NodeKind::Function, qualified_name, self.module.clone(), self.location(line))
            .with_visibility(visibility)
            .with_language(self.language.clone());
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Add an endpoint declared by a routing construct.
    pub fn add_endpoint(&mut self, method: &str, path: &str, handler: &str, framework: &str, line: u32) {
        let node = CodeNode::endpoint(method, path, self.module.clone(), self.location(line))
            .with_language(self.language.clone())
            .with_attribute(ATTR_HANDLER, handler)
            .with_attribute(ATTR_FRAMEWORK, framework);
        self.nodes.push(node);
    }

    /// Record an import with a single candidate module name.
    pub fn add_import(&mut self, module: impl Into<String>) {
        let module = module.into();
        if !module.is_empty() {
            self.imports.push(vec![module]);
        }
    }

    /// Record an import that may name any of `candidates`, most specific first.
    pub fn add_import_candidates(&mut self, candidates: Vec<String>) {
        let candidates: Vec<String> = candidates.into_iter().filter(|c| !c.is_empty()).collect();
        if !candidates.is_empty() {
            self.imports.push(candidates);
        }
    }

    /// Record a call from `from` to the symbol `name`.
    pub fn add_call(&mut self, from: &str, name: impl Into<String>) {
        self.references.push(SymbolRef {
            from: from.to_string(),
            name: name.into(),
            kind: EdgeKind::Calls,
        });
    }

    /// Record that class `from` inherits from or implements `name`.
    pub fn add_base(&mut self, from: &str, name: impl Into<String>) {
        self.references.push(SymbolRef {
            from: from.to_string(),
            name: name.into(),
            kind: EdgeKind::Inherits,
        });
    }

    /// Add a parse warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}
