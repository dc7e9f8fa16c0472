//! Comparison of a graph with the project's previous version.
//!
//! Unlike ontology rules these findings describe one step in the history:
//! a route that moved, an import that disappeared, a call left pointing at a
//! deleted symbol. Endpoints are matched by handler identity, so renaming
//! `GET /users` to `GET /accounts` on the same handler is a path change
//! rather than a removal plus an addition.

use std::collections::{BTreeMap, BTreeSet};

use super::{Hit, Severity};
use crate::graph::{CodeGraph, CodeNode, EdgeKind, EndpointRecord, GraphDigest, NodeKind};
use crate::ontology::BaselineChecks;
use crate::version::{short_hash, DiagramVersion};

pub const API_REMOVED: &str = "api-removed";
pub const API_PATH_CHANGED: &str = "api-path-changed";
pub const API_METHOD_CHANGED: &str = "api-method-changed";
pub const API_HANDLER_MISSING: &str = "api-handler-missing";
pub const SYMBOL_REFERENCE_MISSING: &str = "symbol-reference-missing";
pub const DEPENDENCY_ADDED: &str = "dependency-added";
pub const DEPENDENCY_REMOVED: &str = "dependency-removed";

const RULE_IDS: [&str; 7] = [
    API_REMOVED,
    API_PATH_CHANGED,
    API_METHOD_CHANGED,
    API_HANDLER_MISSING,
    SYMBOL_REFERENCE_MISSING,
    DEPENDENCY_ADDED,
    DEPENDENCY_REMOVED,
];

/// True for rule ids produced by baseline comparison.
pub fn is_baseline_rule(rule_id: &str) -> bool {
    RULE_IDS.contains(&rule_id)
}

/// What a previous version kept of its graph.
#[derive(Debug, Clone, Copy)]
pub struct Baseline<'a> {
    pub commit_hash: &'a str,
    pub digest: &'a GraphDigest,
    pub endpoints: &'a [EndpointRecord],
}

impl<'a> Baseline<'a> {
    pub fn of(version: &'a DiagramVersion) -> Self {
        Self {
            commit_hash: &version.commit_hash,
            digest: &version.graph_digest,
            endpoints: &version.endpoints,
        }
    }
}

/// A hit together with the fixed rule that produced it.
pub(crate) struct Finding {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub hit: Hit,
}

/// Run the enabled comparisons of `graph` against `baseline`.
pub(crate) fn check(baseline: &Baseline<'_>, graph: &CodeGraph, checks: &BaselineChecks) -> Vec<Finding> {
    let mut findings = Vec::new();
    if checks.endpoints {
        let current = graph.endpoints();
        endpoint_changes(baseline, &current, &mut findings);
        missing_handlers(baseline, graph, &mut findings);
    }
    if checks.references {
        missing_references(baseline, graph, &mut findings);
    }
    if checks.dependencies {
        dependency_changes(baseline, graph, &mut findings);
    }
    findings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Route<'a> {
    method: &'a str,
    path: &'a str,
}

impl std::fmt::Display for Route<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Routes grouped by (framework, handler). A route without a known handler
/// is its own identity.
fn routes_by_handler(endpoints: &[EndpointRecord]) -> BTreeMap<(String, String), BTreeSet<Route<'_>>> {
    let mut grouped: BTreeMap<(String, String), BTreeSet<Route<'_>>> = BTreeMap::new();
    for endpoint in endpoints {
        let route = Route {
            method: &endpoint.method,
            path: &endpoint.path,
        };
        let handler = if endpoint.handler.is_empty() {
            route.to_string()
        } else {
            endpoint.handler.clone()
        };
        grouped
            .entry((endpoint.framework.clone(), handler))
            .or_default()
            .insert(route);
    }
    grouped
}

fn endpoint_changes(baseline: &Baseline<'_>, current: &[EndpointRecord], out: &mut Vec<Finding>) {
    let before = routes_by_handler(baseline.endpoints);
    let after = routes_by_handler(current);
    let since = short_hash(baseline.commit_hash);

    for (identity, routes) in &before {
        let handler = identity.1.as_str();
        let Some(now) = after.get(identity) else {
            for route in routes {
                out.push(removed(handler, route, since));
            }
            continue;
        };

        let mut gone: Vec<Route<'_>> = routes.difference(now).copied().collect();
        let mut added: Vec<Route<'_>> = now.difference(routes).copied().collect();

        // Same method, new path.
        gone.retain(|old| match added.iter().position(|new| new.method == old.method) {
            Some(i) => {
                out.push(path_changed(handler, old, &added.remove(i), since));
                false
            }
            None => true,
        });
        // Same path, new method.
        gone.retain(|old| match added.iter().position(|new| new.path == old.path) {
            Some(i) => {
                out.push(method_changed(handler, old, &added.remove(i), since));
                false
            }
            None => true,
        });
        // Both changed: pair what is left in order.
        let mut added = added.into_iter();
        for old in gone {
            match added.next() {
                Some(new) => {
                    out.push(path_changed(handler, &old, &new, since));
                    out.push(method_changed(handler, &old, &new, since));
                }
                None => out.push(removed(handler, &old, since)),
            }
        }
    }
}

fn removed(handler: &str, route: &Route<'_>, since: &str) -> Finding {
    Finding {
        rule_id: API_REMOVED,
        severity: Severity::High,
        hit: Hit {
            component: route.to_string(),
            expected: format!("{route} still served as in {since}"),
            instance: format!("{route} no longer routed to `{handler}`"),
            explanation: format!("Endpoint {route} is not present in the current version"),
            suggested_fix: "Restore the route, or retire it deliberately in a new API version".to_string(),
        },
    }
}

fn path_changed(handler: &str, old: &Route<'_>, new: &Route<'_>, since: &str) -> Finding {
    Finding {
        rule_id: API_PATH_CHANGED,
        severity: Severity::Medium,
        hit: Hit {
            component: handler.to_string(),
            expected: format!("routes of `{handler}` keep their paths from {since}"),
            instance: format!("{old} -> {new}"),
            explanation: format!("Endpoint path changed from {} to {}", old.path, new.path),
            suggested_fix: format!("Keep serving {} or redirect it to {}", old.path, new.path),
        },
    }
}

fn method_changed(handler: &str, old: &Route<'_>, new: &Route<'_>, since: &str) -> Finding {
    Finding {
        rule_id: API_METHOD_CHANGED,
        severity: Severity::Medium,
        hit: Hit {
            component: handler.to_string(),
            expected: format!("routes of `{handler}` keep their methods from {since}"),
            instance: format!("{old} -> {new}"),
            explanation: format!(
                "Endpoint {} changed method from {} to {}",
                old.path, old.method, new.method
            ),
            suggested_fix: format!("Accept {} on {} until clients have moved", old.method, old.path),
        },
    }
}

/// Names of class and function nodes recorded in a digest.
fn digest_symbols(digest: &GraphDigest) -> impl Iterator<Item = (NodeKind, &str)> + '_ {
    digest.nodes.iter().filter_map(|key| {
        [NodeKind::Class, NodeKind::Function].into_iter().find_map(|kind| {
            key.strip_prefix(kind.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|name| (kind, name))
        })
    })
}

fn still_defined(graph: &CodeGraph, name: &str) -> bool {
    [NodeKind::Class, NodeKind::Function]
        .iter()
        .any(|kind| graph.contains(&CodeNode::node_id(*kind, name)))
}

fn missing_handlers(baseline: &Baseline<'_>, graph: &CodeGraph, out: &mut Vec<Finding>) {
    let symbols: BTreeSet<&str> = digest_symbols(baseline.digest).map(|(_, name)| name).collect();
    for endpoint in baseline.endpoints {
        let handler = endpoint.handler.as_str();
        if handler.is_empty() || !symbols.contains(handler) || still_defined(graph, handler) {
            continue;
        }
        out.push(Finding {
            rule_id: API_HANDLER_MISSING,
            severity: Severity::High,
            hit: Hit {
                component: handler.to_string(),
                expected: format!("`{handler}` defined as in {}", short_hash(baseline.commit_hash)),
                instance: format!("{} {}", endpoint.method, endpoint.path),
                explanation: format!(
                    "Handler for endpoint {} {} is missing from the current version",
                    endpoint.method, endpoint.path
                ),
                suggested_fix: format!("Restore `{handler}` or bind the route to its replacement"),
            },
        });
    }
}

fn missing_references(baseline: &Baseline<'_>, graph: &CodeGraph, out: &mut Vec<Finding>) {
    let mut deleted: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (_, name) in digest_symbols(baseline.digest) {
        if !still_defined(graph, name) {
            let simple = name.rsplit('.').next().unwrap_or(name);
            deleted.entry(simple).or_default().push(name);
        }
    }
    if deleted.is_empty() {
        return;
    }

    for reference in &graph.report().unresolved {
        let Some(names) = deleted.get(reference.simple_name()) else {
            continue;
        };
        let from = graph.node(&reference.from).map(|n| n.name.as_str()).unwrap_or(&reference.from);
        let verb = match reference.kind {
            EdgeKind::Inherits => "inherits from",
            _ => "calls",
        };
        for name in names {
            out.push(Finding {
                rule_id: SYMBOL_REFERENCE_MISSING,
                severity: Severity::High,
                hit: Hit {
                    component: name.to_string(),
                    expected: format!("`{name}` defined while it is still referenced"),
                    instance: format!("{from} {verb} {}", reference.name),
                    explanation: format!("`{name}` was deleted but `{from}` still refers to it"),
                    suggested_fix: format!("Restore `{name}` or update the code that references it"),
                },
            });
        }
    }
}

/// Internal or external module name of an import edge key endpoint.
fn module_name(id: &str) -> &str {
    id.strip_prefix("module:").unwrap_or(id)
}

fn dependency_changes(baseline: &Baseline<'_>, graph: &CodeGraph, out: &mut Vec<Finding>) {
    let prefix = format!("{}|", EdgeKind::Imports.as_str());
    let before: BTreeSet<&str> = baseline
        .digest
        .edges
        .iter()
        .filter_map(|key| key.strip_prefix(prefix.as_str()))
        .collect();
    let current: Vec<String> = graph
        .edges_of_kind(EdgeKind::Imports)
        .map(|e| format!("{}|{}", e.source, e.target))
        .collect();
    let after: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let since = short_hash(baseline.commit_hash);

    for pair in after.difference(&before) {
        let Some((source, target)) = pair.split_once('|') else {
            continue;
        };
        let (source, target) = (module_name(source), module_name(target));
        out.push(Finding {
            rule_id: DEPENDENCY_ADDED,
            severity: Severity::Low,
            hit: Hit {
                component: source.to_string(),
                expected: format!("imports of `{source}` as in {since}"),
                instance: format!("{source} imports {target}"),
                explanation: format!("Dependency from `{source}` to `{target}` added"),
                suggested_fix: "Confirm the new dependency belongs in the target architecture".to_string(),
            },
        });
    }
    for pair in before.difference(&after) {
        let Some((source, target)) = pair.split_once('|') else {
            continue;
        };
        let (source, target) = (module_name(source), module_name(target));
        out.push(Finding {
            rule_id: DEPENDENCY_REMOVED,
            severity: Severity::Medium,
            hit: Hit {
                component: source.to_string(),
                expected: format!("imports of `{source}` as in {since}"),
                instance: format!("{source} no longer imports {target}"),
                explanation: format!("Dependency from `{source}` to `{target}` removed"),
                suggested_fix: format!("Check that whatever `{source}` used from `{target}` has a new home"),
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::module_graph;
    use super::*;
    use crate::drift::{evaluate, Violation};
    use crate::graph::{ExtractionReport, SourceLocation, UnresolvedReference, ATTR_FRAMEWORK, ATTR_HANDLER};
    use crate::ontology::CompiledOntology;

    fn api(routes: &[(&str, &str, &str)], functions: &[&str]) -> CodeGraph {
        let loc = SourceLocation::new("api.py", 1);
        let mut graph = CodeGraph::new();
        graph.add_node(CodeNode::new(NodeKind::Module, "api", "api", loc.clone()));
        for name in functions {
            graph.add_node(CodeNode::new(NodeKind::Function, *name, "api", loc.clone()));
        }
        for (method, path, handler) in routes {
            graph.add_node(
                CodeNode::endpoint(method, path, "api", loc.clone())
                    .with_attribute(ATTR_HANDLER, *handler)
                    .with_attribute(ATTR_FRAMEWORK, "flask"),
            );
        }
        graph
    }

    fn compare(before: &CodeGraph, after: &CodeGraph, ontology: &str) -> Vec<Violation> {
        let digest = before.digest();
        let endpoints = before.endpoints();
        let baseline = Baseline {
            commit_hash: "a1b2c3d4e5f60718",
            digest: &digest,
            endpoints: &endpoints,
        };
        let ontology = CompiledOntology::from_yaml(ontology).unwrap();
        evaluate(after, &ontology, Some(&baseline))
    }

    const DEFAULTS: &str = "rules: []";

    #[test]
    fn test_unchanged_graph_has_no_findings() {
        let graph = api(&[("GET", "/users", "api.list_users")], &["api.list_users"]);
        assert!(compare(&graph, &graph, DEFAULTS).is_empty());
    }

    #[test]
    fn test_moved_route_is_a_path_change() {
        let before = api(&[("GET", "/users", "api.list_users")], &["api.list_users"]);
        let after = api(&[("GET", "/accounts", "api.list_users")], &["api.list_users"]);

        let violations = compare(&before, &after, DEFAULTS);
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.rule_id, API_PATH_CHANGED);
        assert_eq!(v.severity, Severity::Medium);
        assert_eq!(v.component, "api.list_users");
        assert_eq!(v.actual, vec!["GET /users -> GET /accounts".to_string()]);
    }

    #[test]
    fn test_changed_verb_is_a_method_change() {
        let before = api(&[("GET", "/users", "api.list_users")], &["api.list_users"]);
        let after = api(&[("POST", "/users", "api.list_users")], &["api.list_users"]);

        let violations = compare(&before, &after, DEFAULTS);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, API_METHOD_CHANGED);
        assert_eq!(violations[0].severity, Severity::Medium);
        assert_eq!(violations[0].actual, vec!["GET /users -> POST /users".to_string()]);
    }

    #[test]
    fn test_method_and_path_change_together() {
        let before = api(&[("GET", "/users", "api.users")], &["api.users"]);
        let after = api(&[("POST", "/accounts", "api.users")], &["api.users"]);

        let rules: Vec<String> = compare(&before, &after, DEFAULTS).into_iter().map(|v| v.rule_id).collect();
        assert_eq!(rules, vec![API_METHOD_CHANGED.to_string(), API_PATH_CHANGED.to_string()]);
    }

    #[test]
    fn test_removed_route_and_handler() {
        let before = api(
            &[("GET", "/users", "api.list_users"), ("GET", "/health", "api.health")],
            &["api.list_users", "api.health"],
        );
        let after = api(&[("GET", "/health", "api.health")], &["api.health"]);

        let violations = compare(&before, &after, DEFAULTS);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.severity == Severity::High));

        assert_eq!(violations[0].rule_id, API_HANDLER_MISSING);
        assert_eq!(violations[0].component, "api.list_users");
        assert_eq!(violations[0].actual, vec!["GET /users".to_string()]);

        assert_eq!(violations[1].rule_id, API_REMOVED);
        assert_eq!(violations[1].component, "GET /users");
    }

    #[test]
    fn test_reference_to_deleted_symbol() {
        let loc = SourceLocation::new("x.py", 1);
        let mut before = module_graph(&["gateway.module", "firmware.driver"], &[]);
        before.add_node(CodeNode::new(NodeKind::Class, "firmware.driver.Driver", "firmware.driver", loc.clone()));

        let mut after = module_graph(&["gateway.module", "firmware.driver"], &[]);
        after.add_node(CodeNode::new(NodeKind::Function, "gateway.module.forward", "gateway.module", loc));
        after.set_report(ExtractionReport {
            unresolved_references: 1,
            unresolved: vec![UnresolvedReference {
                from: "function:gateway.module.forward".into(),
                name: "driver.Driver".into(),
                kind: EdgeKind::Calls,
            }],
            ..Default::default()
        });

        let violations = compare(&before, &after, DEFAULTS);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, SYMBOL_REFERENCE_MISSING);
        assert_eq!(violations[0].component, "firmware.driver.Driver");
        assert_eq!(violations[0].actual, vec!["gateway.module.forward calls driver.Driver".to_string()]);
    }

    #[test]
    fn test_dependency_changes_when_enabled() {
        let before = module_graph(&["a", "b", "c"], &[("a", "b")]);
        let after = module_graph(&["a", "b", "c"], &[("a", "c")]);

        assert!(compare(&before, &after, DEFAULTS).is_empty());

        let violations = compare(&before, &after, "rules: []\nbaseline:\n  dependencies: true\n");
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule_id, DEPENDENCY_REMOVED);
        assert_eq!(violations[0].severity, Severity::Medium);
        assert_eq!(violations[0].actual, vec!["a no longer imports b".to_string()]);
        assert_eq!(violations[1].rule_id, DEPENDENCY_ADDED);
        assert_eq!(violations[1].severity, Severity::Low);
        assert_eq!(violations[1].actual, vec!["a imports c".to_string()]);
    }

    #[test]
    fn test_disabled_checks_report_nothing() {
        let before = api(&[("GET", "/users", "api.list_users")], &["api.list_users"]);
        let after = api(&[], &[]);
        let yaml = "rules: []\nbaseline:\n  endpoints: false\n  references: false\n";
        assert!(compare(&before, &after, yaml).is_empty());
    }
}
