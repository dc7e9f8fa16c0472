mod common;

use std::sync::Arc;
use std::time::Duration;

use archdrift_core::config::ExtractionConfig;
use archdrift_core::drift::{self, Severity};
use archdrift_core::summary::summarize;
use archdrift_core::version::DriftStatus;
use archdrift_core::{CompiledOntology, DiagramType, Extractor, Renderer};
use common::{gateway_tree, write, FakeBackend, GATEWAY_ONTOLOGY};
use tempfile::TempDir;

fn extract(dir: &TempDir) -> archdrift_core::CodeGraph {
    Extractor::new(ExtractionConfig::default()).extract(dir.path()).unwrap()
}

#[test]
fn test_extraction_is_deterministic() {
    let dir = gateway_tree();
    let first = extract(&dir);
    let second = extract(&dir);

    assert_eq!(first.digest(), second.digest());
    assert_eq!(first.stats(), second.stats());
    assert!(first.contains("module:gateway.module"));
    assert!(first.contains("module:firmware.driver"));
}

#[test]
fn test_endpoint_inventory() {
    let graph = extract(&gateway_tree());
    let endpoints = graph.endpoints();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].method, "GET");
    assert_eq!(endpoints[0].path, "/health");
    assert_eq!(endpoints[0].file, "api.py");
}

#[test]
fn test_forbidden_import_is_reported() {
    let graph = extract(&gateway_tree());
    let ontology = CompiledOntology::from_yaml(GATEWAY_ONTOLOGY).unwrap();

    let violations = drift::detect(&graph, &ontology);
    assert_eq!(violations.len(), 1);
    let v = &violations[0];
    assert_eq!(v.rule_id, "gateway-isolation");
    assert_eq!(v.severity, Severity::Critical);
    assert_eq!(v.component, "gateway.module");
    assert_eq!(v.actual, vec!["gateway.module imports firmware.driver".to_string()]);
}

#[test]
fn test_import_cycle_is_one_violation() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.py", "import b\n");
    write(dir.path(), "b.py", "import c\n");
    write(dir.path(), "c.py", "import a\n");
    write(dir.path(), "d.py", "import a\n");
    let graph = extract(&dir);

    let ontology = CompiledOntology::from_yaml("rules:\n  - rule_id: acyclic\n    kind: no_cycle\n").unwrap();
    let violations = drift::detect(&graph, &ontology);

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].component, "a, b, c");
    assert_eq!(violations[0].actual, vec!["a -> b -> c -> a".to_string()]);
}

#[test]
fn test_detection_is_stable_across_runs() {
    let graph = extract(&gateway_tree());
    let ontology = CompiledOntology::from_yaml(GATEWAY_ONTOLOGY).unwrap();
    assert_eq!(drift::detect(&graph, &ontology), drift::detect(&graph, &ontology));
}

#[tokio::test]
async fn test_render_failure_is_isolated() {
    let graph = extract(&gateway_tree());
    let renderer = Renderer::new(
        Arc::new(FakeBackend::failing(&[DiagramType::Api])),
        Duration::from_secs(5),
        DiagramType::ALL.to_vec(),
    );

    let outcome = renderer.render_all(&graph).await;
    assert!(outcome.is_partial());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].diagram_type, DiagramType::Api);
    assert!(outcome.images.iter().all(|i| i.diagram_type != DiagramType::Api));
    for kind in [DiagramType::ClassGlobal, DiagramType::Dependency, DiagramType::Call] {
        assert!(outcome.images.iter().any(|i| i.diagram_type == kind), "missing {kind}");
    }
}

#[tokio::test]
async fn test_render_timeout_becomes_failure() {
    let graph = extract(&gateway_tree());
    let renderer = Renderer::new(
        Arc::new(FakeBackend::slow(Duration::from_secs(2))),
        Duration::from_millis(50),
        vec![DiagramType::Dependency],
    );

    let outcome = renderer.render_all(&graph).await;
    assert!(outcome.images.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].reason.contains("timed out"));
}

#[test]
fn test_baseline_summary() {
    let graph = extract(&gateway_tree());
    let ontology = CompiledOntology::from_yaml(GATEWAY_ONTOLOGY).unwrap();
    let violations = drift::detect(&graph, &ontology);

    let text = summarize(&graph, None, &violations, &DriftStatus::Evaluated);
    assert!(text.readme.starts_with("# Architecture Overview"));
    assert!(text.readme.contains("/health"));
    assert!(text.summary.starts_with("# Summary"));
    assert!(text.summary.contains("Baseline analysis"));
    assert!(text.summary.contains("gateway-isolation"));
}
