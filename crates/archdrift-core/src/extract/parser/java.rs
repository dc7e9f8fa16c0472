//! Java parser using tree-sitter.
//!
//! Spring MVC controllers are recognised through their mapping annotations:
//! a class-level `@RequestMapping` sets the prefix and each `@GetMapping`,
//! `@PostMapping`, ... or `@RequestMapping(method = ...)` on a method adds an
//! endpoint.

use tree_sitter::Node;

use super::module_name_from_path;
use super::result::ParseResult;
use super::routes::{join_paths, method_from_name, ANY_METHOD};
use super::traits::Parser;
use super::treesitter::TreeSitterParser;
use crate::graph::Visibility;

/// Java parser using tree-sitter.
pub struct JavaParser {
    base: TreeSitterParser,
}

/// Declaration context for members of a type.
struct TypeScope {
    qualified: String,
    id: String,
    is_interface: bool,
    route_prefixes: Vec<String>,
}

impl JavaParser {
    pub fn new() -> Self {
        Self {
            base: TreeSitterParser::new(tree_sitter_java::LANGUAGE.into(), "Java", &["java"]),
        }
    }

    fn package_name(root: &Node, content: &str) -> Option<String> {
        let decl = TreeSitterParser::children_of_kind(root, "package_declaration").into_iter().next()?;
        let mut cursor = decl.walk();
        let name = decl
            .named_children(&mut cursor)
            .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))?;
        Some(TreeSitterParser::node_text(&name, content).to_string())
    }

    fn modifiers<'a>(node: &Node<'a>) -> Option<Node<'a>> {
        TreeSitterParser::children_of_kind(node, "modifiers").into_iter().next()
    }

    fn visibility(node: &Node, content: &str, default_public: bool) -> Visibility {
        let Some(modifiers) = Self::modifiers(node) else {
            return if default_public { Visibility::Public } else { Visibility::Private };
        };
        let text = TreeSitterParser::node_text(&modifiers, content);
        let has = |word: &str| text.split_whitespace().any(|w| w == word);
        if has("public") || (default_public && !has("private") && !has("protected")) {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    fn annotations<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
        Self::modifiers(node)
            .map(|m| {
                let mut cursor = m.walk();
                m.named_children(&mut cursor)
                    .filter(|c| matches!(c.kind(), "annotation" | "marker_annotation"))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn annotation_name<'a>(annotation: &Node, content: &'a str) -> &'a str {
        annotation
            .child_by_field_name("name")
            .map(|n| TreeSitterParser::node_text(&n, content))
            .map(|n| n.rsplit('.').next().unwrap_or(n))
            .unwrap_or_default()
    }

    fn extract_import(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let text = TreeSitterParser::node_text(node, content)
            .trim_start_matches("import")
            .trim_end_matches(';')
            .trim();
        let is_static = text.starts_with("static ");
        let target = text.trim_start_matches("static ").trim();
        if let Some(package) = target.strip_suffix(".*") {
            result.add_import(package);
            return;
        }
        if target.is_empty() {
            return;
        }
        let mut candidates = vec![target.to_string()];
        let mut rest = target;
        // Static imports name a member; nested class imports name an inner type.
        while let Some((parent, _)) = rest.rsplit_once('.') {
            if !is_static && candidates.len() > 1 {
                break;
            }
            candidates.push(parent.to_string());
            rest = parent;
            if candidates.len() >= 3 {
                break;
            }
        }
        result.add_import_candidates(candidates);
    }

    fn extract_type(&self, node: &Node, content: &str, outer: Option<&TypeScope>, result: &mut ParseResult) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = TreeSitterParser::node_text(&name_node, content);
        let qualified = match outer {
            Some(outer) => format!("{}.{}", outer.qualified, name),
            None if result.module.rsplit('.').next() == Some(name) => result.module.clone(),
            None => result.qualify(name),
        };
        let visibility = Self::visibility(node, content, outer.is_some_and(|o| o.is_interface));
        let id = result.add_class(qualified.clone(), TreeSitterParser::node_line(node), visibility);

        for field in ["superclass", "interfaces"] {
            if let Some(clause) = node.child_by_field_name(field) {
                for base in type_names(&clause, content) {
                    result.add_base(&id, base);
                }
            }
        }
        for clause in TreeSitterParser::children_of_kind(node, "extends_interfaces") {
            for base in type_names(&clause, content) {
                result.add_base(&id, base);
            }
        }

        let mut route_prefixes = Vec::new();
        for annotation in Self::annotations(node) {
            if Self::annotation_name(&annotation, content) == "RequestMapping" {
                route_prefixes.extend(annotation_paths(&annotation, content));
            }
        }
        if route_prefixes.is_empty() {
            route_prefixes.push(String::new());
        }

        let scope = TypeScope {
            qualified,
            id,
            is_interface: node.kind() == "interface_declaration",
            route_prefixes,
        };
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                self.process_member(&member, content, &scope, result);
            }
        }
    }

    fn process_member(&self, member: &Node, content: &str, scope: &TypeScope, result: &mut ParseResult) {
        match member.kind() {
            "method_declaration" | "constructor_declaration" => {
                let Some(name_node) = member.child_by_field_name("name") else {
                    return;
                };
                let name = TreeSitterParser::node_text(&name_node, content);
                let qualified = format!("{}.{}", scope.qualified, name);
                let visibility = Self::visibility(member, content, scope.is_interface);
                let method_id = result.add_function(qualified.clone(), TreeSitterParser::node_line(member), visibility);
                self.extract_routes(member, content, scope, &qualified, result);
                if let Some(body) = member.child_by_field_name("body") {
                    self.extract_calls(&body, content, &method_id, result);
                }
            }
            "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration" => {
                self.extract_type(member, content, Some(scope), result);
            }
            "enum_body_declarations" => {
                let mut cursor = member.walk();
                for inner in member.named_children(&mut cursor) {
                    self.process_member(&inner, content, scope, result);
                }
            }
            _ => self.extract_calls(member, content, &scope.id, result),
        }
    }

    fn extract_routes(&self, method: &Node, content: &str, scope: &TypeScope, handler: &str, result: &mut ParseResult) {
        for annotation in Self::annotations(method) {
            let name = Self::annotation_name(&annotation, content);
            let verbs: Vec<String> = match name {
                "RequestMapping" => {
                    let declared = request_methods(&annotation, content);
                    if declared.is_empty() {
                        vec![ANY_METHOD.to_string()]
                    } else {
                        declared
                    }
                }
                other => match other.strip_suffix("Mapping").and_then(method_from_name) {
                    Some(verb) => vec![verb],
                    None => continue,
                },
            };
            let mut paths = annotation_paths(&annotation, content);
            if paths.is_empty() {
                paths.push(String::new());
            }
            let line = TreeSitterParser::node_line(&annotation);
            for prefix in &scope.route_prefixes {
                for path in &paths {
                    let full = join_paths(prefix, path);
                    for verb in &verbs {
                        result.add_endpoint(verb, &full, handler, "spring", line);
                    }
                }
            }
        }
    }

    /// Extract method invocations and constructor calls from a node.
    fn extract_calls(&self, node: &Node, content: &str, caller_id: &str, result: &mut ParseResult) {
        match node.kind() {
            "method_invocation" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = TreeSitterParser::node_text(&name, content);
                    match node.child_by_field_name("object") {
                        Some(object) if matches!(object.kind(), "identifier" | "field_access" | "this") => {
                            let object = TreeSitterParser::node_text(&object, content);
                            if object.contains(['(', '\n', ' ']) {
                                result.add_call(caller_id, name);
                            } else {
                                result.add_call(caller_id, format!("{}.{}", object, name));
                            }
                        }
                        _ => result.add_call(caller_id, name),
                    }
                }
            }
            "object_creation_expression" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let text = TreeSitterParser::node_text(&ty, content);
                    result.add_call(caller_id, text.split('<').next().unwrap_or(text).trim());
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.extract_calls(&child, content, caller_id, result);
        }
    }

    fn process_node(&self, node: Node, content: &str, result: &mut ParseResult) {
        match node.kind() {
            "import_declaration" => self.extract_import(&node, content, result),
            "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
            | "annotation_type_declaration" => self.extract_type(&node, content, None, result),
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.process_node(child, content, result);
                }
            }
        }
    }
}

/// Simple names of the types listed in an `extends`/`implements` clause.
fn type_names(clause: &Node, content: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut stack = vec![*clause];
    while let Some(node) = stack.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "type_identifier" | "scoped_type_identifier" => {
                    names.push(TreeSitterParser::node_text(&child, content).to_string());
                }
                "generic_type" => {
                    let mut inner = child.walk();
                    if let Some(base) = child
                        .named_children(&mut inner)
                        .find(|c| matches!(c.kind(), "type_identifier" | "scoped_type_identifier"))
                    {
                        names.push(TreeSitterParser::node_text(&base, content).to_string());
                    };
                }
                "type_list" => stack.push(child),
                _ => {}
            }
        }
    }
    names.sort();
    names
}

/// Paths from an annotation's positional value or its `value`/`path` element.
fn annotation_paths(annotation: &Node, content: &str) -> Vec<String> {
    let Some(args) = annotation.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        match arg.kind() {
            "string_literal" | "element_value_array_initializer" => collect_strings(&arg, content, &mut paths),
            "element_value_pair" => {
                let key = arg.child_by_field_name("key").map(|k| TreeSitterParser::node_text(&k, content));
                if matches!(key, Some("value" | "path")) {
                    if let Some(value) = arg.child_by_field_name("value") {
                        collect_strings(&value, content, &mut paths);
                    }
                }
            }
            _ => {}
        }
    }
    paths
}

/// `method = RequestMethod.GET` or `method = {RequestMethod.GET, RequestMethod.POST}`.
fn request_methods(annotation: &Node, content: &str) -> Vec<String> {
    let Some(args) = annotation.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        if arg.kind() != "element_value_pair" {
            continue;
        }
        let key = arg.child_by_field_name("key").map(|k| TreeSitterParser::node_text(&k, content));
        if key != Some("method") {
            continue;
        }
        let Some(value) = arg.child_by_field_name("value") else {
            return Vec::new();
        };
        return TreeSitterParser::node_text(&value, content)
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '.')
            .filter_map(|token| method_from_name(token.rsplit('.').next().unwrap_or(token)))
            .collect();
    }
    Vec::new()
}

fn collect_strings(node: &Node, content: &str, out: &mut Vec<String>) {
    if node.kind() == "string_literal" {
        out.push(TreeSitterParser::string_value(node, content));
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_strings(&child, content, out);
    }
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for JavaParser {
    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, String> {
        let tree = self.base.parse_tree(content)?;
        let root = tree.root_node();
        let stem = module_name_from_path(path, &[]);
        let stem = stem.rsplit('.').next().unwrap_or(&stem).to_string();
        let module = match Self::package_name(&root, content) {
            Some(package) => format!("{}.{}", package, stem),
            None => stem,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    const CONTROLLER: &str = r#"
package com.acme.shop.web;

import com.acme.shop.service.OrderService;
import java.util.List;

@RestController
@RequestMapping("/api/orders")
public class OrderController extends BaseController implements Auditable {
    private final OrderService service;

    public OrderController(OrderService service) {
        this.service = service;
    }

    @GetMapping
    public List<Order> list() {
        return service.findAll();
    }

    @PostMapping("/{id}/cancel")
    public void cancel(Long id) {
        service.cancel(id);
    }

    @RequestMapping(value = "/search", method = {RequestMethod.GET, RequestMethod.POST})
    public List<Order> search() {
        return new OrderQuery().run();
    }

    private void audit() {}
}
"#;

    #[test]
    fn test_java_declarations() {
        let result = JavaParser::new()
            .parse_file("src/main/java/com/acme/shop/web/OrderController.java", CONTROLLER)
            .unwrap();
        assert_eq!(result.module, "com.acme.shop.web.OrderController");

        let class = result.nodes.iter().find(|n| n.kind == NodeKind::Class).unwrap();
        assert_eq!(class.name, "com.acme.shop.web.OrderController");
        assert_eq!(class.visibility, Visibility::Public);

        let audit = result.nodes.iter().find(|n| n.name.ends_with(".audit")).unwrap();
        assert_eq!(audit.visibility, Visibility::Private);

        assert!(result.imports.contains(&vec![
            "com.acme.shop.service.OrderService".to_string(),
            "com.acme.shop.service".to_string(),
        ]));
        let bases: Vec<&str> = result
            .references
            .iter()
            .filter(|r| r.kind == crate::graph::EdgeKind::Inherits)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(bases, vec!["BaseController", "Auditable"]);
        assert!(result.references.iter().any(|r| r.name == "service.findAll"));
        assert!(result.references.iter().any(|r| r.name == "OrderQuery"));
    }

    #[test]
    fn test_spring_routes() {
        let result = JavaParser::new().parse_file("OrderController.java", CONTROLLER).unwrap();
        let endpoints: Vec<&str> = result
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Endpoint)
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(
            endpoints,
            vec![
                "GET /api/orders",
                "POST /api/orders/{id}/cancel",
                "GET /api/orders/search",
                "POST /api/orders/search",
            ]
        );
        let cancel = result.nodes.iter().find(|n| n.name == "POST /api/orders/{id}/cancel").unwrap();
        assert_eq!(cancel.attribute("handler"), Some("com.acme.shop.web.OrderController.cancel"));
    }
}
