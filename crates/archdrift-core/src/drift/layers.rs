use super::{Hit, RuleView};
use crate::ontology::CompiledLayer;

fn layer_of<'l>(layers: &'l [CompiledLayer], name: &str) -> Option<&'l CompiledLayer> {
    layers.iter().find(|layer| layer.matches(name))
}

/// Edges that leave a layer for one it is not allowed to use. Nodes outside
/// every layer are unconstrained.
pub(crate) fn check(view: &RuleView<'_>, layers: &[CompiledLayer]) -> Vec<Hit> {
    view.edges()
        .filter_map(|(edge, from, to)| {
            let source_layer = layer_of(layers, &from.name)?;
            let target_layer = layer_of(layers, &to.name)?;
            if source_layer.allowed.contains(&target_layer.name) {
                return None;
            }
            let allowed: Vec<&str> = source_layer.allowed.iter().map(String::as_str).collect();
            Some(Hit {
                component: from.name.clone(),
                expected: format!(
                    "layer `{}` may depend only on: {}",
                    source_layer.name,
                    allowed.join(", ")
                ),
                instance: format!(
                    "{} [{}] {} {} [{}]",
                    from.name, source_layer.name, edge.kind, to.name, target_layer.name
                ),
                explanation: format!(
                    "`{}` in layer `{}` reaches into layer `{}`",
                    from.name, source_layer.name, target_layer.name
                ),
                suggested_fix: format!(
                    "Move the dependency behind an abstraction owned by `{}` or relocate `{}`",
                    source_layer.name, from.name
                ),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::module_graph;
    use crate::drift::detect;
    use crate::ontology::CompiledOntology;

    const LAYERS: &str = r#"
rules:
  - rule_id: layering
    kind: layer_order
    severity: high
    layers:
      - name: api
        patterns: ["api(\\..*)?"]
      - name: service
        patterns: ["service(\\..*)?"]
      - name: storage
        patterns: ["storage(\\..*)?"]
"#;

    #[test]
    fn test_downward_edges_pass() {
        let graph = module_graph(
            &["api.users", "service.users", "storage.db"],
            &[("api.users", "service.users"), ("service.users", "storage.db"), ("api.users", "storage.db")],
        );
        let ontology = CompiledOntology::from_yaml(LAYERS).unwrap();
        assert!(detect(&graph, &ontology).is_empty());
    }

    #[test]
    fn test_upward_edge_flagged() {
        let graph = module_graph(
            &["api.users", "storage.db", "storage.cache"],
            &[("storage.db", "api.users"), ("storage.cache", "api.users")],
        );
        let ontology = CompiledOntology::from_yaml(LAYERS).unwrap();
        let violations = detect(&graph, &ontology);

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].component, "storage.cache");
        assert_eq!(violations[1].component, "storage.db");
        assert_eq!(violations[1].expected, "layer `storage` may depend only on: storage");
        assert_eq!(violations[1].actual, vec!["storage.db [storage] imports api.users [api]".to_string()]);
    }

    #[test]
    fn test_may_use_skipping_layer() {
        let yaml = r#"
rules:
  - rule_id: strict
    kind: layer_order
    layers:
      - name: api
        patterns: ["api\\..*"]
        may_use: [service]
      - name: service
        patterns: ["service\\..*"]
      - name: storage
        patterns: ["storage\\..*"]
"#;
        let graph = module_graph(
            &["api.x", "service.x", "storage.x", "util"],
            &[("api.x", "service.x"), ("api.x", "storage.x"), ("api.x", "util")],
        );
        let ontology = CompiledOntology::from_yaml(yaml).unwrap();
        let violations = detect(&graph, &ontology);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].actual[0], "api.x [api] imports storage.x [storage]");
    }
}
