//! Python parser using tree-sitter.
//!
//! Besides classes and functions it recognises three routing styles:
//! Flask `@app.route(path, methods=[...])`, FastAPI `@router.get(path)` and
//! Django `path()`/`re_path()` declarations in `urls.py`.

use tree_sitter::Node;

use super::module_name_from_path;
use super::result::ParseResult;
use super::routes::{method_from_name, normalize_path, ANY_METHOD};
use super::traits::Parser;
use super::treesitter::TreeSitterParser;
use crate::graph::Visibility;

/// Python parser using tree-sitter.
pub struct PythonParser {
    base: TreeSitterParser,
}

/// Where a node sits while walking the tree.
#[derive(Clone, Default)]
struct Scope {
    /// Qualified name of the enclosing class.
    class: Option<String>,
    /// Id of the enclosing class node, if any.
    class_id: Option<String>,
}

impl PythonParser {
    pub fn new() -> Self {
        Self {
            base: TreeSitterParser::new(
                tree_sitter_python::LANGUAGE.into(),
                "Python",
                &["py", "pyi"],
            ),
        }
    }

    fn visibility(name: &str) -> Visibility {
        if name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__")) {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    /// Package that relative imports in this file start from.
    fn package_of(path: &str, module: &str) -> String {
        let is_package_marker = path.ends_with("__init__.py") || path.ends_with("__init__.pyi");
        if is_package_marker {
            module.to_string()
        } else {
            module.rsplit_once('.').map(|(pkg, _)| pkg.to_string()).unwrap_or_default()
        }
    }

    fn extract_import(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => result.add_import(TreeSitterParser::node_text(&child, content)),
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        result.add_import(TreeSitterParser::node_text(&name, content));
                    }
                }
                _ => {}
            }
        }
    }

    fn extract_import_from(&self, node: &Node, content: &str, path: &str, result: &mut ParseResult) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };

        let base = if module_node.kind() == "relative_import" {
            let text = TreeSitterParser::node_text(&module_node, content);
            let dots = text.chars().take_while(|c| *c == '.').count();
            let mut package: Vec<String> = Self::package_of(path, &result.module)
                .split('.')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            for _ in 1..dots {
                package.pop();
            }
            let rest = text.trim_start_matches('.');
            if !rest.is_empty() {
                package.push(rest.to_string());
            }
            package.join(".")
        } else {
            TreeSitterParser::node_text(&module_node, content).to_string()
        };

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            let name_node = if child.kind() == "aliased_import" {
                child.child_by_field_name("name")
            } else {
                Some(child)
            };
            if let Some(name_node) = name_node {
                names.push(TreeSitterParser::node_text(&name_node, content).to_string());
            }
        }

        if names.is_empty() {
            result.add_import(base);
            return;
        }
        for name in names {
            let submodule = if base.is_empty() { name } else { format!("{}.{}", base, name) };
            result.add_import_candidates(vec![submodule, base.clone()]);
        }
    }

    fn extract_class(&self, node: &Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = TreeSitterParser::node_text(&name_node, content);
        let qualified = match &scope.class {
            Some(outer) => format!("{}.{}", outer, name),
            None => result.qualify(name),
        };
        let class_id = result.add_class(qualified.clone(), TreeSitterParser::node_line(node), Self::visibility(name));

        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for base in bases.named_children(&mut cursor) {
                if matches!(base.kind(), "identifier" | "attribute") {
                    let base_name = TreeSitterParser::node_text(&base, content);
                    if base_name != "object" {
                        result.add_base(&class_id, base_name);
                    }
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let inner = Scope {
                class: Some(qualified),
                class_id: Some(class_id),
            };
            self.process_children(&body, content, &inner, result);
        }
    }

    fn extract_function(&self, node: &Node, content: &str, scope: &Scope, result: &mut ParseResult) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let name = TreeSitterParser::node_text(&name_node, content);
        let qualified = match &scope.class {
            Some(class) => format!("{}.{}", class, name),
            None => result.qualify(name),
        };
        let func_id = result.add_function(qualified.clone(), TreeSitterParser::node_line(node), Self::visibility(name));

        if let Some(body) = node.child_by_field_name("body") {
            self.extract_calls(&body, content, &func_id, result);
        }
        Some(qualified)
    }

    /// Extract function calls from a node.
    fn extract_calls(&self, node: &Node, content: &str, caller_id: &str, result: &mut ParseResult) {
        if node.kind() == "call" {
            if let Some(func_node) = node.child_by_field_name("function") {
                match func_node.kind() {
                    "identifier" => {
                        result.add_call(caller_id, TreeSitterParser::node_text(&func_node, content));
                    }
                    "attribute" => {
                        let text = TreeSitterParser::node_text(&func_node, content);
                        if text.contains(['(', '[', '\n']) {
                            if let Some(attr) = func_node.child_by_field_name("attribute") {
                                result.add_call(caller_id, TreeSitterParser::node_text(&attr, content));
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

    /// Flask and FastAPI route decorators on a function.
    fn extract_decorator_routes(&self, decorators: &[Node], content: &str, handler: &str, result: &mut ParseResult) {
        for decorator in decorators {
            let Some(call) = decorator.named_child(0).filter(|n| n.kind() == "call") else {
                continue;
            };
            let Some(func) = call.child_by_field_name("function").filter(|n| n.kind() == "attribute") else {
                continue;
            };
            let Some(attr) = func.child_by_field_name("attribute") else {
                continue;
            };
            let verb = TreeSitterParser::node_text(&attr, content);
            let Some(args) = call.child_by_field_name("arguments") else {
                continue;
            };
            let Some(path) = first_string_argument(&args, content) else {
                continue;
            };
            let line = TreeSitterParser::node_line(decorator);

            if verb == "route" {
                let methods = keyword_string_list(&args, content, "methods");
                if methods.is_empty() {
                    result.add_endpoint("GET", &path, handler, "flask", line);
                }
                for method in methods {
                    result.add_endpoint(&method, &path, handler, "flask", line);
                }
            } else if let Some(method) = method_from_name(verb) {
                result.add_endpoint(&method, &path, handler, "fastapi", line);
            }
        }
    }

    /// Django `path()`, `re_path()` and `url()` entries.
    fn extract_django_route(&self, node: &Node, content: &str, result: &mut ParseResult) {
        let Some(func) = node.child_by_field_name("function") else {
            return;
        };
        let name = TreeSitterParser::node_text(&func, content);
        if !matches!(name, "path" | "re_path" | "url") {
            return;
        }
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let positional: Vec<Node> = args
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "keyword_argument" && n.kind() != "comment")
            .collect();
        let Some(route) = positional.first().filter(|n| n.kind() == "string") else {
            return;
        };
        let Some(view) = positional.get(1) else {
            return;
        };
        let view_text = TreeSitterParser::node_text(view, content);
        if view_text.starts_with("include(") {
            return;
        }
        let route = TreeSitterParser::string_value(route, content);
        let route = route.trim_start_matches('^').trim_end_matches('$');
        result.add_endpoint(
            ANY_METHOD,
            &normalize_path(route),
            view_text,
            "django",
            TreeSitterParser::node_line(node),
        );
    }

    fn process_children(&self, node: &Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.process_node(child, content, scope, result);
        }
    }

    fn process_node(&self, node: Node, content: &str, scope: &Scope, result: &mut ParseResult) {
        match node.kind() {
            "import_statement" => self.extract_import(&node, content, result),
            "import_from_statement" => {
                let path = result.file_path.clone();
                self.extract_import_from(&node, content, &path, result);
            }
            "class_definition" => self.extract_class(&node, content, scope, result),
            "function_definition" => {
                self.extract_function(&node, content, scope, result);
            }
            "decorated_definition" => {
                let mut cursor = node.walk();
                let decorators: Vec<Node> = node
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "decorator")
                    .collect();
                if let Some(definition) = node.child_by_field_name("definition") {
                    match definition.kind() {
                        "function_definition" => {
                            if let Some(handler) = self.extract_function(&definition, content, scope, result) {
                                self.extract_decorator_routes(&decorators, content, &handler, result);
                            }
                        }
                        "class_definition" => self.extract_class(&definition, content, scope, result),
                        _ => {}
                    }
                }
            }
            "call" => {
                if let Some(class_id) = &scope.class_id {
                    self.extract_calls(&node, content, class_id, result);
                } else if is_urlconf(&result.file_path) {
                    self.extract_django_route(&node, content, result);
                    self.process_children(&node, content, scope, result);
                }
            }
            _ => self.process_children(&node, content, scope, result),
        }
    }
}

fn is_urlconf(path: &str) -> bool {
    path == "urls.py" || path.ends_with("/urls.py")
}

fn first_string_argument(args: &Node, content: &str) -> Option<String> {
    let mut cursor = args.walk();
    let first = args.named_children(&mut cursor).find(|n| n.kind() != "comment")?;
    (first.kind() == "string").then(|| TreeSitterParser::string_value(&first, content))
}

fn keyword_string_list(args: &Node, content: &str, keyword: &str) -> Vec<String> {
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        if arg.kind() != "keyword_argument" {
            continue;
        }
        let name = arg.child_by_field_name("name").map(|n| TreeSitterParser::node_text(&n, content));
        if name != Some(keyword) {
            continue;
        }
        let Some(value) = arg.child_by_field_name("value") else {
            return Vec::new();
        };
        return TreeSitterParser::children_of_kind(&value, "string")
            .iter()
            .map(|s| TreeSitterParser::string_value(s, content).to_ascii_uppercase())
            .collect();
    }
    Vec::new()
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for PythonParser {
    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, String> {
        let tree = self.base.parse_tree(content)?;
        let module = module_name_from_path(path, &["__init__"]);
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
