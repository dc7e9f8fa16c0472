//! TypeScript and JavaScript parser using tree-sitter.
//!
//! Express-style route registrations (`app.get('/path', handler)`,
//! `router.post(...)`) become endpoint nodes.

use tree_sitter::Node;

use super::module_name_from_path;
use super::resolve_relative_path;
use super::result::ParseResult;
use super::routes::{method_from_name, normalize_path};
use super::traits::Parser;
use super::treesitter::TreeSitterParser;
use crate::graph::Visibility;

/// TypeScript parser using tree-sitter.
pub struct TypeScriptParser {
    base: TreeSitterParser,
    /// Grammar used for `.tsx` files.
    tsx: Option<TreeSitterParser>,
}

#[derive(Clone, Default)]
struct Scope {
    class: Option<(String, String)>,
    exported: bool,
}

impl TypeScriptParser {
    /// Create a TypeScript parser.
    pub fn typescript() -> Self {
        Self {
            base: TreeSitterParser::new(
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                "TypeScript",
                &["ts", "tsx"],
            ),
            tsx: Some(TreeSitterParser::new(
                tree_sitter_typescript::LANGUAGE_TSX.into(),
                "TypeScript",
                &["tsx"],
            )),
        }
    }

    /// Create a JavaScript parser.
    pub fn javascript() -> Self {
        Self {
            base: TreeSitterParser::new(
                tree_sitter_javascript::LANGUAGE.into(),
                "JavaScript",
                &["js", "jsx", "mjs", "cjs"],
            ),
            tsx: None,
        }
    }

    fn grammar_for(&self, path: &str) -> &TreeSitterParser {
        match &self.tsx {
            Some(tsx) if path.to_ascii_lowercase().ends_with(".tsx") => tsx,
            _ => &self.base,
        }
    }

    fn import_target(path: &str, specifier: &str) -> String {
        resolve_relative_path(path, specifier).unwrap_or_else(|| specifier.replace('/', "."))
    }

    fn record_import(&self, source: &Node, content: &str, result: &mut ParseResult) {
        let specifier = TreeSitterParser::string_value(source, content);
        let target = Self::import_target(&result.file_path, &specifier);
        result.add_import(target);
    }

    fn extract_class(&self, node: &Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = TreeSitterParser::node_text(&name_node, content);
        let qualified = result.qualify(name);
        let visibility = if scope.exported { Visibility::Public } else { Visibility::Private };
        let class_id = result.add_class(qualified.clone(), TreeSitterParser::node_line(node), visibility);

        let mut bases = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if matches!(child.kind(), "class_heritage" | "extends_type_clause") {
                collect_heritage(&child, content, &mut bases);
            }
        }
        for base in bases {
            result.add_base(&class_id, base);
        }

        if let Some(body) = node.child_by_field_name("body") {
            let inner = Scope {
                class: Some((qualified, class_id)),
                exported: false,
            };
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                self.process_member(&member, content, &inner, result);
            }
        }
    }

    fn process_member(&self, member: &Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        let Some((class_name, class_id)) = &scope.class else {
            return;
        };
        let body = match member.kind() {
            "method_definition" => member.child_by_field_name("body"),
            "public_field_definition" | "field_definition" => member
                .child_by_field_name("value")
                .filter(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function")),
            _ => {
                self.extract_calls(member, content, class_id, result);
                return;
            }
        };
        let name_node = member
            .child_by_field_name("name")
            .or_else(|| member.child_by_field_name("property"));
        let (Some(body), Some(name_node)) = (body, name_node) else {
            self.extract_calls(member, content, class_id, result);
            return;
        };

        let name = TreeSitterParser::node_text(&name_node, content);
        let private_modifier = TreeSitterParser::children_of_kind(member, "accessibility_modifier")
            .iter()
            .any(|m| matches!(TreeSitterParser::node_text(m, content), "private" | "protected"));
        let visibility = if private_modifier || name.starts_with('#') {
            Visibility::Private
        } else {
            Visibility::Public
        };
        let method_id = result.add_function(
            format!("{}.{}", class_name, name.trim_start_matches('#')),
            TreeSitterParser::node_line(member),
            visibility,
        );
        self.extract_calls(&body, content, &method_id, result);
    }

    /// Extract function calls from a node (function body).
    fn extract_calls(&self, node: &Node, content: &str, caller_id: &str, result: &mut ParseResult) {
        match node.kind() {
            "call_expression" => {
                self.extract_route(node, content, result);
                if let Some(func_node) = node.child_by_field_name("function") {
                    match func_node.kind() {
                        "identifier" => {
                            let name = TreeSitterParser::node_text(&func_node, content);
                            if name == "require" {
                                self.extract_require(node, content, result);
                            } else {
                                result.add_call(caller_id, name);
                            }
                        }
                        "member_expression" => {
                            let text = TreeSitterParser::node_text(&func_node, content);
                            if text.contains(['(', '[', '\n', ' ']) {
                                if let Some(prop) = func_node.child_by_field_name("property") {
                                    result.add_call(caller_id, TreeSitterParser::node_text(&prop, content));
                                }
                            } else {
                                result.add_call(caller_id, text);
                            }
                        }
                        _ => {}
                    }
                }
            }
            "new_expression" => {
                if let Some(constructor) = node.child_by_field_name("constructor") {
                    result.add_call(caller_id, TreeSitterParser::node_text(&constructor, content));
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.extract_calls(&child, content, caller_id, result);
        }
    }

    fn extract_require(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let first = args.named_children(&mut cursor).next();
        if let Some(source) = first.filter(|n| n.kind() == "string") {
            self.record_import(&source, content, result);
        }
    }

    /// Express route registration: `app.get('/path', ..., handler)`.
    fn extract_route(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let Some(func) = node.child_by_field_name("function").filter(|f| f.kind() == "member_expression") else {
            return;
        };
        let (Some(object), Some(property)) = (func.child_by_field_name("object"), func.child_by_field_name("property")) else {
            return;
        };
        if object.kind() != "identifier" || !is_router_name(TreeSitterParser::node_text(&object, content)) {
            return;
        }
        let Some(method) = method_from_name(TreeSitterParser::node_text(&property, content)) else {
            return;
        };
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let positional: Vec<Node> = args.named_children(&mut cursor).filter(|n| n.kind() != "comment").collect();
        let Some(path_node) = positional.first().filter(|n| matches!(n.kind(), "string" | "template_string")) else {
            return;
        };
        if positional.len() < 2 {
            return;
        }
        let path = TreeSitterParser::string_value(path_node, content);
        let handler = positional
            .last()
            .filter(|h| matches!(h.kind(), "identifier" | "member_expression"))
            .map(|h| TreeSitterParser::node_text(h, content).to_string())
            .unwrap_or_else(|| "<inline>".to_string());

        result.add_endpoint(&method, &normalize_path(&path), &handler, "express", TreeSitterParser::node_line(node));
    }

    fn process_children(&self, node: &Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.process_node(child, content, scope, result);
        }
    }

    fn process_node(&self, node: Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        match node.kind() {
            "import_statement" => {
                if let Some(source) = node.child_by_field_name("source") {
                    self.record_import(&source, content, result);
                }
            }
            "export_statement" => {
                if let Some(source) = node.child_by_field_name("source") {
                    self.record_import(&source, content, result);
                }
                let exported = Scope {
                    exported: true,
                    ..scope.clone()
                };
                self.process_children(&node, content, &exported, result);
            }
            "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
                self.extract_class(&node, content, scope, result);
            }
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = TreeSitterParser::node_text(&name, content);
                    let func_id = result.add_function(
                        result.qualify(name),
                        TreeSitterParser::node_line(&node),
                        if scope.exported { Visibility::Public } else { Visibility::Private },
                    );
                    if let Some(body) = node.child_by_field_name("body") {
                        self.extract_calls(&body, content, &func_id, result);
                    }
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                for declarator in node.named_children(&mut cursor) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let name = declarator.child_by_field_name("name");
                    let value = declarator.child_by_field_name("value");
                    match (name, value) {
                        (Some(name), Some(value))
                            if name.kind() == "identifier"
                                && matches!(value.kind(), "arrow_function" | "function_expression" | "function") =>
                        {
                            let name = TreeSitterParser::node_text(&name, content);
                            let func_id = result.add_function(
                                result.qualify(name),
                                TreeSitterParser::node_line(&declarator),
                                if scope.exported { Visibility::Public } else { Visibility::Private },
                            );
                            if let Some(body) = value.child_by_field_name("body") {
                                self.extract_calls(&body, content, &func_id, result);
                            }
                        }
                        (_, Some(value)) => self.process_node(value, content, scope, result),
                        _ => {}
                    }
                }
            }
            "call_expression" => {
                self.extract_route(&node, content, result);
                let is_require = node
                    .child_by_field_name("function")
                    .is_some_and(|f| TreeSitterParser::node_text(&f, content) == "require");
                if is_require {
                    self.extract_require(&node, content, result);
                }
                self.process_children(&node, content, scope, result);
            }
            _ => self.process_children(&node, content, scope, result),
        }
    }
}

fn is_router_name(name: &str) -> bool {
    matches!(name, "app" | "router" | "server" | "api") || name.ends_with("Router") || name.ends_with("router")
}

fn collect_heritage(node: &Node, content: &str, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "identifier" | "type_identifier" | "member_expression" | "nested_type_identifier" => {
                out.push(TreeSitterParser::node_text(&child, content).to_string());
            }
            "generic_type" => {
                if let Some(name) = child.child_by_field_name("name") {
                    out.push(TreeSitterParser::node_text(&name, content).to_string());
                }
            }
            "extends_clause" | "implements_clause" => collect_heritage(&child, content, out),
            _ => {}
        }
    }
}

impl Parser for TypeScriptParser {
    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, String> {
        let tree = self.grammar_for(path).parse_tree(content)?;
        let module = module_name_from_path(path, &["index"]);
        let mut result = ParseResult::new(path, self.language_name(), module);

        self.process_node(tree.root_node(), content, &Scope::default(), &mut result);

        Ok(result)
    }

    fn language_name(&self) -> &'static str {
        self.base.language_name()
    }

    fn supported_extensions(&self) -> &[&'static str] {
        self.base.extensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn names(result: &ParseResult, kind: NodeKind) -> Vec<&str> {
        result.nodes.iter().filter(|n| n.kind == kind).map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_typescript_classes_and_imports() {
        let source = r#"
import { Repo } from './repo';
import express from 'express';

export class UserService extends BaseService implements Auditable {
    private cache = new Map();

    constructor(private repo: Repo) {
        super();
    }

    findAll() {
        return this.repo.list();
    }
}

function internal() {
    return helper();
}
"#;
        let result = TypeScriptParser::typescript().parse_file("src/users/service.ts", source).unwrap();
        assert_eq!(result.module, "src.users.service");
        assert_eq!(names(&result, NodeKind::Class), vec!["src.users.service.UserService"]);
        assert!(names(&result, NodeKind::Function).contains(&"src.users.service.UserService.findAll"));

        let class = result.nodes.iter().find(|n| n.kind == NodeKind::Class).unwrap();
        assert_eq!(class.visibility, Visibility::Public);
        let internal = result.nodes.iter().find(|n| n.name.ends_with(".internal")).unwrap();
        assert_eq!(internal.visibility, Visibility::Private);

        assert!(result.imports.contains(&vec!["src.users.repo".to_string()]));
        assert!(result.imports.contains(&vec!["express".to_string()]));
        assert!(result.references.iter().any(|r| r.name == "BaseService"));
        assert!(result.references.iter().any(|r| r.name == "Auditable"));
        assert!(result.references.iter().any(|r| r.name == "this.repo.list"));
    }

    #[test]
    fn test_express_routes() {
        let source = r#"
const express = require('express');
const router = express.Router();
const users = require('./controllers/users');

router.get('/users', users.list);
router.post('/users', auth, users.create);
app.delete(`/users/:id`, (req, res) => res.send());
"#;
        let result = TypeScriptParser::javascript().parse_file("routes/index.js", source).unwrap();
        assert_eq!(result.module, "routes");
        assert_eq!(
            names(&result, NodeKind::Endpoint),
            vec!["GET /users", "POST /users", "DELETE /users/:id"]
        );
        let create = result.nodes.iter().find(|n| n.name == "POST /users").unwrap();
        assert_eq!(create.attribute("handler"), Some("users.create"));
        assert!(result.imports.contains(&vec!["routes.controllers.users".to_string()]));
    }

    #[test]
    fn test_tsx_uses_jsx_grammar() {
        let source = "export const App = () => <div className=\"app\">hi</div>;\n";
        let result = TypeScriptParser::typescript().parse_file("web/App.tsx", source).unwrap();
        assert_eq!(names(&result, NodeKind::Function), vec!["web.App.App"]);
    }
}
