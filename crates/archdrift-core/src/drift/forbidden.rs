use super::{Hit, RuleView};
use crate::ontology::Pattern;

/// Every inspected edge from a `source` match to a `target` match.
pub(crate) fn check(view: &RuleView<'_>, source: &Pattern, target: &Pattern) -> Vec<Hit> {
    let kinds: Vec<&str> = view.rule().edges.iter().map(|k| k.as_str()).collect();
    let expected = format!(
        "no {} edges from `{}` to `{}`",
        kinds.join("/"),
        source.as_str(),
        target.as_str()
    );

    view.edges()
        .filter(|(_, from, to)| source.matches(&from.name) && target.matches(&to.name))
        .map(|(edge, from, to)| Hit {
            component: from.name.clone(),
            expected: expected.clone(),
            instance: format!("{} {} {}", from.name, edge.kind, to.name),
            explanation: format!(
                "`{}` depends on `{}`, which the target architecture forbids",
                from.name, to.name
            ),
            suggested_fix: format!(
                "Remove the dependency of `{}` on modules matching `{}` or route it through an allowed component",
                from.name,
                target.as_str()
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::module_graph;
    use crate::drift::detect;
    use crate::ontology::CompiledOntology;

    const GATEWAY: &str = r#"
rules:
  - rule_id: gateway-firmware
    kind: forbidden_edge
    severity: critical
    source: "gateway.*"
    target: "firmware.*"
"#;

    #[test]
    fn test_gateway_to_firmware_flagged() {
        let graph = module_graph(
            &["gateway_module", "firmware_driver", "service"],
            &[("gateway_module", "firmware_driver"), ("gateway_module", "service")],
        );
        let ontology = CompiledOntology::from_yaml(GATEWAY).unwrap();
        let violations = detect(&graph, &ontology);

        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.rule_id, "gateway-firmware");
        assert_eq!(v.component, "gateway_module");
        assert_eq!(v.actual, vec!["gateway_module imports firmware_driver".to_string()]);
    }

    #[test]
    fn test_hits_from_one_component_merge() {
        let graph = module_graph(
            &["gateway.api", "firmware.a", "firmware.b"],
            &[("gateway.api", "firmware.a"), ("gateway.api", "firmware.b")],
        );
        let ontology = CompiledOntology::from_yaml(GATEWAY).unwrap();
        let violations = detect(&graph, &ontology);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].actual.len(), 2);
    }

    #[test]
    fn test_reverse_direction_allowed() {
        let graph = module_graph(&["gateway", "firmware"], &[("firmware", "gateway")]);
        let ontology = CompiledOntology::from_yaml(GATEWAY).unwrap();
        assert!(detect(&graph, &ontology).is_empty());
    }

    #[test]
    fn test_external_targets_need_opt_in() {
        let mut graph = module_graph(&["gateway"], &[]);
        graph.add_node(
            crate::graph::CodeNode::new(
                crate::graph::NodeKind::Module,
                "firmware_sdk",
                "firmware_sdk",
                crate::graph::SourceLocation::new("gateway.py", 1),
            )
            .with_attribute(crate::graph::ATTR_EXTERNAL, "true"),
        );
        graph.add_edge(crate::graph::CodeEdge::new(
            crate::graph::EdgeKind::Imports,
            "module:gateway",
            "module:firmware_sdk",
        ));

        let ontology = CompiledOntology::from_yaml(GATEWAY).unwrap();
        assert!(detect(&graph, &ontology).is_empty());

        let opted_in = CompiledOntology::from_yaml(&format!("{GATEWAY}    include_external: true\n")).unwrap();
        assert_eq!(detect(&graph, &opted_in).len(), 1);
    }
}
