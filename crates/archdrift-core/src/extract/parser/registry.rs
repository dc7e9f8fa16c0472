//! Extension-based dispatch to the built-in language parsers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::go::GoParser;
use super::java::JavaParser;
use super::python::PythonParser;
use super::rust::RustParser;
use super::traits::Parser;
use super::typescript::TypeScriptParser;

/// The parsers a snapshot is walked with, indexed by lowercase extension.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn Parser>>,
    by_extension: HashMap<String, usize>,
}

impl ParserRegistry {
    /// Python, Java, TypeScript, JavaScript, Go and Rust.
    pub fn new() -> Self {
        let mut registry = Self {
            parsers: Vec::new(),
            by_extension: HashMap::new(),
        };
        registry.register(Arc::new(PythonParser::new()));
        registry.register(Arc::new(JavaParser::new()));
        registry.register(Arc::new(TypeScriptParser::typescript()));
        registry.register(Arc::new(TypeScriptParser::javascript()));
        registry.register(Arc::new(GoParser::new()));
        registry.register(Arc::new(RustParser::new()));
        registry
    }

    /// A later parser takes over any extension an earlier one claimed.
    fn register(&mut self, parser: Arc<dyn Parser>) {
        let index = self.parsers.len();
        for ext in parser.supported_extensions() {
            self.by_extension.insert(ext.to_ascii_lowercase(), index);
        }
        self.parsers.push(parser);
    }

    /// Parser for a snapshot-relative path, chosen by its final extension.
    pub fn parser_for_path(&self, path: &str) -> Option<&dyn Parser> {
        let ext = Path::new(path).extension()?.to_str()?;
        let index = self.by_extension.get(&ext.to_ascii_lowercase())?;
        self.parsers.get(*index).map(|parser| parser.as_ref())
    }

    /// Registered language names, sorted.
    pub fn languages(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.parsers.iter().map(|p| p.language_name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
