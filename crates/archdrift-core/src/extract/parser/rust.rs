//! Rust parser using syn for AST-based extraction.
//!
//! Extracts:
//! - Structs, enums and traits (as class nodes)
//! - Free functions, inherent and trait methods
//! - `use` declarations as imports
//! - Trait implementations and supertraits as inheritance
//! - Call relationships (function and method calls within bodies)
//! - axum `.route(path, get(handler))` and actix `#[get(path)]` endpoints

use proc_macro2::Span;
use syn::{
    spanned::Spanned, visit::Visit, Attribute, Expr, ExprLit, ImplItem, Item, ItemFn, ItemImpl,
    ItemMod, ItemTrait, Lit, TraitItem, Type, TypeParamBound, UseTree, Visibility as SynVisibility,
};

use super::module_name_from_path;
use super::result::ParseResult;
use super::routes::method_from_name;
use super::traits::Parser;
use crate::graph::Visibility;

/// Rust parser using syn for AST-based extraction.
pub struct RustParser {
    /// Whether to extract call relationships (requires body analysis).
    extract_calls: bool,
}

impl RustParser {
    /// Create a new Rust parser with default settings.
    pub fn new() -> Self {
        Self { extract_calls: true }
    }

    /// Create a parser without call extraction.
    pub fn without_calls() -> Self {
        Self { extract_calls: false }
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for RustParser {
    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, String> {
        let syntax = syn::parse_file(content).map_err(|e| format!("Parse error: {}", e))?;

        let module = module_name_from_path(path, &["mod", "lib", "main"]);
        let mut visitor = RustVisitor::new(ParseResult::new(path, self.language_name(), module), self.extract_calls);
        visitor.visit_file(&syntax);

        Ok(visitor.result)
    }

    fn language_name(&self) -> &'static str {
        "Rust"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["rs"]
    }
}

/// Visitor that extracts entities from Rust AST.
struct RustVisitor {
    result: ParseResult,
    extract_calls: bool,
    /// Inline `mod` blocks enclosing the current item.
    inline_modules: Vec<String>,
}

impl RustVisitor {
    fn new(result: ParseResult, extract_calls: bool) -> Self {
        Self {
            result,
            extract_calls,
            inline_modules: Vec::new(),
        }
    }

    /// Get line number from span.
    fn line_of(span: Span) -> u32 {
        span.start().line as u32
    }

    fn convert_visibility(vis: &SynVisibility) -> Visibility {
        match vis {
            SynVisibility::Public(_) => Visibility::Public,
            _ => Visibility::Private,
        }
    }

    /// Qualify an item name with the file module and any inline modules.
    fn qualify(&self, name: &str) -> String {
        let mut local = self.inline_modules.clone();
        local.push(name.to_string());
        self.result.qualify(&local.join("."))
    }

    fn process_use(&mut self, tree: &UseTree) {
        let mut paths = Vec::new();
        flatten_use_tree(tree, &mut Vec::new(), &mut paths);
        for (segments, is_glob) in paths {
            let segments = strip_path_prefix(&segments);
            if segments.is_empty() {
                continue;
            }
            let full = segments.join(".");
            if is_glob || segments.len() == 1 {
                self.result.add_import(full);
            } else {
                let parent = segments[..segments.len() - 1].join(".");
                self.result.add_import_candidates(vec![full, parent]);
            }
        }
    }

    fn process_function(&mut self, item: &ItemFn) {
        let name = item.sig.ident.to_string();
        let id = self.result.add_function(
            self.qualify(&name),
            Self::line_of(item.sig.ident.span()),
            Self::convert_visibility(&item.vis),
        );
        self.extract_attribute_routes(&item.attrs, &self.qualify(&name));
        self.extract_calls_from_body(&id, &item.block);
    }

    fn process_trait(&mut self, item: &ItemTrait) {
        let name = item.ident.to_string();
        let qualified = self.qualify(&name);
        let id = self.result.add_class(
            qualified.clone(),
            Self::line_of(item.ident.span()),
            Self::convert_visibility(&item.vis),
        );
        for bound in &item.supertraits {
            if let TypeParamBound::Trait(t) = bound {
                self.result.add_base(&id, path_to_name(&t.path));
            }
        }
        for trait_item in &item.items {
            if let TraitItem::Fn(method) = trait_item {
                if let Some(block) = &method.default {
                    let method_name = method.sig.ident.to_string();
                    let method_id = self.result.add_function(
                        format!("{}.{}", qualified, method_name),
                        Self::line_of(method.sig.ident.span()),
                        Self::convert_visibility(&item.vis),
                    );
                    self.extract_calls_from_body(&method_id, block);
                }
            }
        }
    }

    fn process_impl(&mut self, item: &ItemImpl) {
        let Some(type_name) = type_name(&item.self_ty) else {
            return;
        };
        let qualified_type = self.qualify(&type_name);

        if let Some((_, trait_path, _)) = &item.trait_ {
            let class_id = crate::graph::CodeNode::node_id(crate::graph::NodeKind::Class, &qualified_type);
            self.result.add_base(&class_id, path_to_name(trait_path));
        }

        for impl_item in &item.items {
            if let ImplItem::Fn(method) = impl_item {
                let method_name = method.sig.ident.to_string();
                // Trait methods take the trait's visibility.
                let visibility = if item.trait_.is_some() {
                    Visibility::Public
                } else {
                    Self::convert_visibility(&method.vis)
                };
                let qualified = format!("{}.{}", qualified_type, method_name);
                let method_id = self.result.add_function(
                    qualified.clone(),
                    Self::line_of(method.sig.ident.span()),
                    visibility,
                );
                self.extract_attribute_routes(&method.attrs, &qualified);
                self.extract_calls_from_body(&method_id, &method.block);
            }
        }
    }

    fn process_mod(&mut self, item: &ItemMod) {
        let Some((_, items)) = &item.content else {
            return;
        };
        // Unit tests are not part of the architecture.
        if has_cfg_test(&item.attrs) {
            return;
        }
        self.inline_modules.push(item.ident.to_string());
        for inner in items {
            self.visit_item(inner);
        }
        self.inline_modules.pop();
    }

    /// actix-web style `#[get("/path")]` handlers.
    fn extract_attribute_routes(&mut self, attrs: &[Attribute], handler: &str) {
        for attr in attrs {
            let Some(ident) = attr.path().segments.last().map(|s| s.ident.to_string()) else {
                continue;
            };
            let Some(method) = method_from_name(&ident) else {
                continue;
            };
            let Ok(path) = attr.parse_args_with(|input: syn::parse::ParseStream| {
                let lit: syn::LitStr = input.parse()?;
                let _ = input.parse::<proc_macro2::TokenStream>()?;
                Ok(lit.value())
            }) else {
                continue;
            };
            let line = Self::line_of(attr.span());
            self.result.add_endpoint(&method, &path, handler, "actix", line);
        }
    }

    fn extract_calls_from_body(&mut self, caller_id: &str, block: &syn::Block) {
        let mut extractor = CallExtractor::new(self.extract_calls);
        extractor.visit_block(block);
        for name in extractor.calls {
            self.result.add_call(caller_id, name);
        }
        for route in extractor.routes {
            self.result
                .add_endpoint(&route.method, &route.path, &route.handler, "axum", route.line);
        }
    }
}

impl<'ast> Visit<'ast> for RustVisitor {
    fn visit_item(&mut self, item: &'ast Item) {
        match item {
            Item::Use(u) => self.process_use(&u.tree),
            Item::Fn(f) => self.process_function(f),
            Item::Struct(s) => {
                let qualified = self.qualify(&s.ident.to_string());
                self.result
                    .add_class(qualified, Self::line_of(s.ident.span()), Self::convert_visibility(&s.vis));
            }
            Item::Enum(e) => {
                let qualified = self.qualify(&e.ident.to_string());
                self.result
                    .add_class(qualified, Self::line_of(e.ident.span()), Self::convert_visibility(&e.vis));
            }
            Item::Trait(t) => self.process_trait(t),
            Item::Impl(i) => self.process_impl(i),
            Item::Mod(m) => self.process_mod(m),
            _ => {}
        }
    }
}

/// A route registered in a function body.
struct BodyRoute {
    method: String,
    path: String,
    handler: String,
    line: u32,
}

/// Visitor that extracts function calls and axum routes from a code block.
struct CallExtractor {
    record_calls: bool,
    calls: Vec<String>,
    routes: Vec<BodyRoute>,
}

impl CallExtractor {
    fn new(record_calls: bool) -> Self {
        Self {
            record_calls,
            calls: Vec::new(),
            routes: Vec::new(),
        }
    }

    fn add_call(&mut self, callee_name: String) {
        if self.record_calls {
            self.calls.push(callee_name);
        }
    }

    /// `.route("/path", get(list).post(create))`
    fn extract_route(&mut self, node: &syn::ExprMethodCall) {
        if node.method != "route" || node.args.len() != 2 {
            return;
        }
        let Some(Expr::Lit(ExprLit { lit: Lit::Str(path), .. })) = node.args.first() else {
            return;
        };
        let Some(router) = node.args.last() else {
            return;
        };
        let mut handlers = Vec::new();
        collect_method_router(router, &mut handlers);
        let line = RustVisitor::line_of(node.method.span());
        for (method, handler) in handlers {
            self.routes.push(BodyRoute {
                method,
                path: path.value(),
                handler,
                line,
            });
        }
    }
}

impl<'ast> syn::visit::Visit<'ast> for CallExtractor {
    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Expr::Path(path) = &*node.func {
            let segments = strip_path_prefix(
                &path.path.segments.iter().map(|s| s.ident.to_string()).collect::<Vec<_>>(),
            );
            if !segments.is_empty() {
                self.add_call(segments.join("."));
            }
        }
        syn::visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        self.extract_route(node);
        self.add_call(node.method.to_string());
        syn::visit::visit_expr_method_call(self, node);
    }

    fn visit_item(&mut self, _node: &'ast Item) {
        // Nested items are not part of the enclosing body.
    }
}

/// Collect `(METHOD, handler)` pairs from an axum method router expression.
fn collect_method_router(expr: &Expr, out: &mut Vec<(String, String)>) {
    match expr {
        Expr::Call(call) => {
            if let Expr::Path(func) = &*call.func {
                if let Some(last) = func.path.segments.last() {
                    if let (Some(method), Some(handler)) = (method_from_name(&last.ident.to_string()), call.args.first()) {
                        out.push((method, expr_name(handler)));
                    }
                }
            }
        }
        Expr::MethodCall(call) => {
            collect_method_router(&call.receiver, out);
            if let (Some(method), Some(handler)) = (method_from_name(&call.method.to_string()), call.args.first()) {
                out.push((method, expr_name(handler)));
            }
        }
        _ => {}
    }
}

fn expr_name(expr: &Expr) -> String {
    match expr {
        Expr::Path(p) => path_to_name(&p.path),
        _ => "<inline>".to_string(),
    }
}

fn path_to_name(path: &syn::Path) -> String {
    let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
    strip_path_prefix(&segments).join(".")
}

/// Drop `crate`, `self`, `super` and `Self` prefixes from a path.
fn strip_path_prefix(segments: &[String]) -> Vec<String> {
    let skip = segments
        .iter()
        .take_while(|s| matches!(s.as_str(), "crate" | "self" | "super" | "Self"))
        .count();
    segments[skip..].to_vec()
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        Type::Reference(r) => type_name(&r.elem),
        _ => None,
    }
}

fn has_cfg_test(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("cfg")
            && attr
                .parse_args::<syn::Ident>()
                .map(|ident| ident == "test")
                .unwrap_or(false)
    })
}

/// Expand a `use` tree into flat paths, each tagged with whether it is a glob.
fn flatten_use_tree(tree: &UseTree, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, bool)>) {
    match tree {
        UseTree::Path(p) => {
            prefix.push(p.ident.to_string());
            flatten_use_tree(&p.tree, prefix, out);
            prefix.pop();
        }
        UseTree::Name(n) => {
            let mut path = prefix.clone();
            if n.ident != "self" {
                path.push(n.ident.to_string());
            }
            out.push((path, false));
        }
        UseTree::Rename(r) => {
            let mut path = prefix.clone();
            path.push(r.ident.to_string());
            out.push((path, false));
        }
        UseTree::Glob(_) => out.push((prefix.clone(), true)),
        UseTree::Group(g) => {
            for item in &g.items {
                flatten_use_tree(item, prefix, out);
            }
        }
    }
}
