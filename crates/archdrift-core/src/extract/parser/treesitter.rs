//! Tree-sitter based parsing utilities shared across language parsers.

use tree_sitter::{Language, Node, Parser as TSParser, Tree};

/// Base tree-sitter parser with shared functionality.
pub struct TreeSitterParser {
    language: Language,
    language_name: &'static str,
    extensions: &'static [&'static str],
}

impl TreeSitterParser {
    pub fn new(
        language: Language,
        language_name: &'static str,
        extensions: &'static [&'static str],
    ) -> Self {
        Self {
            language,
            language_name,
            extensions,
        }
    }

    /// Parse source code into a tree-sitter tree.
    ///
    /// Tree-sitter recovers from syntax errors, but a file that needed
    /// recovery is reported as a failure so partial trees never reach the graph.
    pub fn parse_tree(&self, content: &str) -> Result<Tree, String> {
        let mut parser = TSParser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| format!("Failed to set language: {}", e))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| "Failed to parse content".to_string())?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(&root).map(|n| Self::node_line(&n)).unwrap_or(1);
            return Err(format!("{} syntax error near line {}", self.language_name, line));
        }
        Ok(tree)
    }

    pub fn language_name(&self) -> &'static str {
        self.language_name
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    /// Get text for a node from source content.
    pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
        &content[node.byte_range()]
    }

    /// Get line number (1-based) for a node.
    pub fn node_line(node: &Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    /// Find all named children of a specific kind.
    pub fn children_of_kind<'a>(node: &Node<'a>, kind: &str) -> Vec<Node<'a>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|n| n.kind() == kind)
            .collect()
    }

    /// Text of a string literal with its quotes removed.
    pub fn string_value(node: &Node, content: &str) -> String {
        unquote(Self::node_text(node, content))
    }
}

fn first_error<'a>(node: &Node<'a>) -> Option<Node<'a>> {
    if node.is_error() || node.is_missing() {
        return Some(*node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'a>> = node.children(&mut cursor).collect();
    children.iter().filter(|c| c.has_error()).find_map(first_error)
}

/// Strip one layer of matching quotes (`'`, `"`, `` ` ``) and any string
/// prefix such as Python's `r` or `f`.
pub fn unquote(text: &str) -> String {
    let text = text.trim();
    let body = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return body[quote.len()..body.len() - quote.len()].to_string();
        }
    }
    text.to_string()
}
