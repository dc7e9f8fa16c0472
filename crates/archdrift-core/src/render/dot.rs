//! Minimal DOT text builder.

/// Quote a DOT identifier or plain string.
pub fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escape a field of a record-shaped label.
pub fn escape_record(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '{' | '}' | '|' | '<' | '>' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Accumulates statements of one `digraph`.
#[derive(Debug)]
pub struct DotBuilder {
    lines: Vec<String>,
    depth: usize,
}

impl DotBuilder {
    pub fn digraph(rankdir: &str) -> Self {
        Self {
            lines: vec!["digraph G {".to_string(), format!("  rankdir={rankdir};")],
            depth: 1,
        }
    }

    fn push(&mut self, line: String) {
        self.lines.push(format!("{}{}", "  ".repeat(self.depth), line));
    }

    /// Node with a record label; `label` must already be escaped.
    pub fn record(&mut self, id: &str, label: &str) {
        self.push(format!("{} [shape=record, label=\"{}\"];", quote(id), label));
    }

    pub fn node(&mut self, id: &str, attrs: &[(&str, &str)]) {
        self.push(format!("{}{};", quote(id), render_attrs(attrs)));
    }

    pub fn edge(&mut self, from: &str, to: &str, attrs: &[(&str, &str)]) {
        self.push(format!("{} -> {}{};", quote(from), quote(to), render_attrs(attrs)));
    }

    pub fn open_cluster(&mut self, name: &str, label: &str) {
        self.push(format!("subgraph {} {{", quote(&format!("cluster_{name}"))));
        self.depth += 1;
        self.push(format!("label={};", quote(label)));
    }

    pub fn close_cluster(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.push("}".to_string());
    }

    /// Placeholder shown when a projection has nothing to draw.
    pub fn placeholder(&mut self, text: &str) {
        self.node(text, &[("shape", "plaintext")]);
    }

    pub fn finish(mut self) -> String {
        self.lines.push("}".to_string());
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

fn render_attrs(attrs: &[(&str, &str)]) -> String {
    if attrs.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = attrs
        .iter()
        .map(|(key, value)| format!("{key}={}", quote(value)))
        .collect();
    format!(" [{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_record_escape() {
        assert_eq!(escape_record("Map<K, V>"), "Map\\<K, V\\>");
        assert_eq!(escape_record("{id}|x"), "\\{id\\}\\|x");
    }

    #[test]
    fn test_builder_output() {
        let mut dot = DotBuilder::digraph("LR");
        dot.open_cluster("pkg", "pkg");
        dot.node("a", &[]);
        dot.close_cluster();
        dot.edge("a", "b", &[("style", "dashed")]);
        let text = dot.finish();
        assert_eq!(
            text,
            "digraph G {\n  rankdir=LR;\n  subgraph \"cluster_pkg\" {\n    label=\"pkg\";\n    \"a\";\n  }\n  \"a\" -> \"b\" [style=\"dashed\"];\n}\n"
        );
    }
}
