use super::{Hit, RuleView};
use crate::graph::{NodeKind, Visibility};
use std::collections::BTreeSet;

/// Public nodes whose kind is outside the allow-list.
pub(crate) fn check(view: &RuleView<'_>, allowed: &BTreeSet<NodeKind>) -> Vec<Hit> {
    let allowed_names: Vec<&str> = allowed.iter().map(|k| k.as_str()).collect();
    let expected = if allowed_names.is_empty() {
        "no public entities".to_string()
    } else {
        format!("public surface limited to: {}", allowed_names.join(", "))
    };

    view.nodes()
        .filter(|node| node.visibility == Visibility::Public && !allowed.contains(&node.kind))
        .map(|node| Hit {
            component: node.name.clone(),
            expected: expected.clone(),
            instance: format!(
                "public {} {} at {}:{}",
                node.kind, node.name, node.location.file, node.location.line
            ),
            explanation: format!("`{}` exposes a public {} outside the allowed surface", node.name, node.kind),
            suggested_fix: format!("Make `{}` private or move it behind an allowed entry point", node.name),
        })
        .collect()
}
