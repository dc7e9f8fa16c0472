//! Language front-ends that turn one source file into graph fragments.
//!
//! Each front-end implements [`Parser`] and reports what it found in a single
//! file: the entities it declares, the modules it imports and the symbols it
//! references. Nothing here resolves names across files; that is the job of
//! the [`GraphBuilder`](crate::graph::GraphBuilder).
//!
//! ## Supported Languages
//!
//! - Rust (syn)
//! - TypeScript/JavaScript (tree-sitter)
//! - Python (tree-sitter)
//! - Go (tree-sitter)
//! - Java (tree-sitter)

mod go;
mod java;
mod python;
mod registry;
mod result;
mod routes;
mod rust;
mod traits;
mod treesitter;
mod typescript;

pub use go::GoParser;
pub use java::JavaParser;
pub use python::PythonParser;
pub use registry::ParserRegistry;
pub use result::{ParseResult, SymbolRef};
pub use rust::RustParser;
pub use traits::Parser;
pub use typescript::TypeScriptParser;

/// Derive a dotted module name from a snapshot-relative path.
///
/// `billing/service.py` becomes `billing.service`. Files that stand for their
/// directory (`__init__.py`, `index.ts`, `mod.rs`, ...) take the directory's
/// name; a package marker at the snapshot root keeps its own stem.
pub fn module_name_from_path(path: &str, directory_markers: &[&str]) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_start_matches("./");
    let (dir, file) = match trimmed.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", trimmed),
    };
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };

    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    if !(directory_markers.contains(&stem) && !segments.is_empty()) {
        segments.push(stem);
    }
    segments.join(".")
}

/// Directory part of a relative path, as a dotted name.
pub fn directory_module_name(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.trim_start_matches("./").rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("."),
        None => String::new(),
    }
}

/// Resolve a `./` or `../` import specifier against the importing file.
///
/// Returns the dotted module name of the target, or `None` when the
/// specifier is not relative or climbs above the snapshot root.
pub fn resolve_relative_path(importer: &str, specifier: &str) -> Option<String> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        return None;
    }
    let importer = importer.replace('\\', "/");
    let mut parts: Vec<&str> = match importer.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    let last = parts.pop()?;
    let stem = SCRIPT_EXTENSIONS
        .iter()
        .find_map(|ext| last.strip_suffix(&format!(".{ext}")))
        .unwrap_or(last);
    if stem != "index" || parts.is_empty() {
        parts.push(stem);
    }
    Some(parts.join("."))
}

const SCRIPT_EXTENSIONS: [&str; 6] = ["js", "jsx", "ts", "tsx", "mjs", "cjs"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(module_name_from_path("billing/service.py", &["__init__"]), "billing.service");
        assert_eq!(module_name_from_path("billing/__init__.py", &["__init__"]), "billing");
        assert_eq!(module_name_from_path("__init__.py", &["__init__"]), "__init__");
        assert_eq!(module_name_from_path("src/api/index.ts", &["index"]), "src.api");
        assert_eq!(module_name_from_path("main.go", &[]), "main");
    }

    #[test]
    fn test_resolve_relative_path() {
        assert_eq!(
            resolve_relative_path("src/api/routes.ts", "./service").as_deref(),
            Some("src.api.service")
        );
        assert_eq!(
            resolve_relative_path("src/api/routes.ts", "../db/index.js").as_deref(),
            Some("src.db")
        );
        assert_eq!(resolve_relative_path("src/api/routes.ts", "../db").as_deref(), Some("src.db"));
        assert_eq!(resolve_relative_path("a.ts", "../../x"), None);
        assert_eq!(resolve_relative_path("a.ts", "react"), None);
    }

    #[test]
    fn test_directory_module_name() {
        assert_eq!(directory_module_name("cmd/server/main.go"), "cmd.server");
        assert_eq!(directory_module_name("main.go"), "");
    }
}
