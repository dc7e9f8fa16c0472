//! Go parser using tree-sitter.
//!
//! A Go package is a directory, so every file in a directory reports the same
//! module. Routes are recognised for `net/http` (`HandleFunc`, `Handle`) and
//! for router libraries with verb-named registration methods (gin, echo, chi).

use tree_sitter::Node;

use super::directory_module_name;
use super::result::ParseResult;
use super::routes::{method_from_name, normalize_path, ANY_METHOD};
use super::traits::Parser;
use super::treesitter::TreeSitterParser;
use crate::graph::Visibility;

/// Go parser using tree-sitter.
pub struct GoParser {
    base: TreeSitterParser,
}

impl GoParser {
    pub fn new() -> Self {
        Self {
            base: TreeSitterParser::new(tree_sitter_go::LANGUAGE.into(), "Go", &["go"]),
        }
    }

    fn visibility(name: &str) -> Visibility {
        if name.chars().next().is_some_and(|c| c.is_uppercase()) {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    fn package_name(root: &Node, content: &str) -> Option<String> {
        let clause = TreeSitterParser::children_of_kind(root, "package_clause").into_iter().next()?;
        let name = TreeSitterParser::children_of_kind(&clause, "package_identifier").into_iter().next()?;
        Some(TreeSitterParser::node_text(&name, content).to_string())
    }

    fn extract_imports(&self, node: &Node, content: &str, result: &mut ParseResult) {
        if node.kind() == "import_spec" {
            if let Some(path) = node.child_by_field_name("path") {
                let import = TreeSitterParser::string_value(&path, content);
                result.add_import(import.replace('/', "."));
            }
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.extract_imports(&child, content, result);
        }
    }

    fn extract_type(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let (Some(name_node), Some(type_node)) = (node.child_by_field_name("name"), node.child_by_field_name("type")) else {
            return;
        };
        if !matches!(type_node.kind(), "struct_type" | "interface_type") {
            return;
        }
        let name = TreeSitterParser::node_text(&name_node, content);
        let class_id = result.add_class(result.qualify(name), TreeSitterParser::node_line(node), Self::visibility(name));

        // Embedded fields and embedded interfaces act as bases.
        let mut embedded = Vec::new();
        collect_embedded(&type_node, content, &mut embedded);
        for base in embedded {
            result.add_base(&class_id, base);
        }
    }

    fn extract_function(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = TreeSitterParser::node_text(&name_node, content);
        let qualified = match node.child_by_field_name("receiver").and_then(|r| receiver_type(&r, content)) {
            Some(receiver) => result.qualify(&format!("{}.{}", receiver, name)),
            None => result.qualify(name),
        };
        let func_id = result.add_function(qualified, TreeSitterParser::node_line(node), Self::visibility(name));
        if let Some(body) = node.child_by_field_name("body") {
            self.extract_calls(&body, content, &func_id, result);
        }
    }

    /// Extract function calls from a node.
    fn extract_calls(&self, node: &Node, content: &str, caller_id: &str, result: &mut ParseResult) {
        if node.kind() == "call_expression" {
            self.extract_route(node, content, result);
            if let Some(func_node) = node.child_by_field_name("function") {
                match func_node.kind() {
                    "identifier" => {
                        result.add_call(caller_id, TreeSitterParser::node_text(&func_node, content));
                    }
                    "selector_expression" => {
                        let text = TreeSitterParser::node_text(&func_node, content);
                        if text.contains(['(', '[', '\n', ' ']) {
                            if let Some(field) = func_node.child_by_field_name("field") {
                                result.add_call(caller_id, TreeSitterParser::node_text(&field, content));
                            }
                        } else {
                            result.add_call(caller_id, text);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.extract_calls(&child, content, caller_id, result);
        }
    }

    fn extract_route(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let Some(func) = node.child_by_field_name("function").filter(|f| f.kind() == "selector_expression") else {
            return;
        };
        let Some(field) = func.child_by_field_name("field") else {
            return;
        };
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let positional: Vec<Node> = args.named_children(&mut cursor).filter(|n| n.kind() != "comment").collect();
        if positional.len() < 2 {
            return;
        }
        let Some(pattern) = positional
            .first()
            .filter(|n| matches!(n.kind(), "interpreted_string_literal" | "raw_string_literal"))
            .map(|n| TreeSitterParser::string_value(n, content))
        else {
            return;
        };
        let handler = positional
            .last()
            .filter(|h| matches!(h.kind(), "identifier" | "selector_expression"))
            .map(|h| TreeSitterParser::node_text(h, content).to_string())
            .unwrap_or_else(|| "<inline>".to_string());
        let line = TreeSitterParser::node_line(node);

        let verb = TreeSitterParser::node_text(&field, content);
        match verb {
            "HandleFunc" | "Handle" => {
                // Go 1.22 patterns may carry a method: "GET /items/{id}".
                let (method, path) = match pattern.split_once(' ') {
                    Some((method, path)) if method_from_name(method).is_some() => (method.to_ascii_uppercase(), path.trim().to_string()),
                    _ => (ANY_METHOD.to_string(), pattern.clone()),
                };
                result.add_endpoint(&method, &normalize_path(&path), &handler, "net/http", line);
            }
            _ => {
                let Some(method) = method_from_name(verb) else {
                    return;
                };
                if !pattern.starts_with('/') {
                    return;
                }
                let framework = if verb.chars().all(|c| c.is_ascii_uppercase()) { "gin" } else { "chi" };
                result.add_endpoint(&method, &pattern, &handler, framework, line);
            }
        }
    }

    fn process_node(&self, node: Node, content: &str, result: &mut ParseResult) {
        match node.kind() {
            "import_declaration" => self.extract_imports(&node, content, result),
            "type_spec" => self.extract_type(&node, content, result),
            "function_declaration" | "method_declaration" => self.extract_function(&node, content, result),
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.process_node(child, content, result);
                }
            }
        }
    }
}

fn receiver_type(receiver: &Node, content: &str) -> Option<String> {
    let mut cursor = receiver.walk();
    let param = receiver.named_children(&mut cursor).find(|n| n.kind() == "parameter_declaration")?;
    let ty = param.child_by_field_name("type")?;
    let text = TreeSitterParser::node_text(&ty, content).trim_start_matches('*');
    // Drop type parameters from generic receivers: `List[T]`.
    Some(text.split('[').next().unwrap_or(text).trim().to_string())
}

fn collect_embedded(type_node: &Node, content: &str, out: &mut Vec<String>) {
    let mut stack = vec![*type_node];
    while let Some(node) = stack.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "field_declaration" if child.child_by_field_name("name").is_none() => {
                    if let Some(ty) = child.child_by_field_name("type") {
                        let text = TreeSitterParser::node_text(&ty, content).trim_start_matches('*');
                        out.push(text.to_string());
                    }
                }
                "type_elem" | "constraint_elem" => {
                    out.push(TreeSitterParser::node_text(&child, content).to_string());
                }
                "field_declaration_list" => stack.push(child),
                _ => {}
            }
        }
    }
    out.sort();
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for GoParser {
    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, String> {
        let tree = self.base.parse_tree(content)?;
        let root = tree.root_node();
        let module = match directory_module_name(path) {
            dir if !dir.is_empty() => dir,
            _ => Self::package_name(&root, content).unwrap_or_else(|| "main".to_string()),
        };
        let mut result = ParseResult::new(path, self.language_name(), module);

        self.process_node(root, content, &mut result);

        Ok(result)
    }

    fn language_name(&self) -> &'static str {
        self.base.language_name()
    }

    fn supported_extensions(&self) -> &[&'static str] {
        self.base.extensions()
    }
}
