mod common;

use std::time::Duration;

use archdrift_core::drift::{baseline, Severity};
use archdrift_core::scheduler::{LastOutcome, Poller, ProjectState, SchedulerError};
use archdrift_core::version::DriftStatus;
use archdrift_core::{
    AnalysisRequest, DiagramType, Project, Report, TriggerPayload, TriggerResponse, TriggerSource, VersionSelector,
    VersionStore,
};
use common::{clean_gateway_tree, commit, gateway_tree, harness, write, FakeBackend, Harness, GATEWAY_ONTOLOGY};
use tempfile::TempDir;

const FIRST: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334";
const SECOND: &str = "b2c3d4e5f60718293a4b5c6d7e8f900112233445";

fn manual(commit_ref: &str) -> AnalysisRequest {
    AnalysisRequest::new(commit_ref, TriggerSource::Manual)
}

async fn analyse(h: &Harness, project: &Project, commit_ref: &str) -> TriggerResponse {
    let response = h.scheduler.request_analysis(&project.id, manual(commit_ref)).unwrap();
    h.scheduler.wait_idle(&project.id).await;
    response
}

#[tokio::test]
async fn test_analysis_persists_version() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "Initial import"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();
    h.scheduler.set_ontology(&project.id, GATEWAY_ONTOLOGY).await.unwrap();

    assert_eq!(analyse(&h, &project, "main").await, TriggerResponse::Accepted);

    let status = h.scheduler.status(&project.id).unwrap();
    assert_eq!(status.state, ProjectState::Idle);
    assert!(matches!(status.last_outcome, Some(LastOutcome::Persisted { .. })));

    let version = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert_eq!(version.commit_hash, FIRST);
    assert_eq!(version.commit_message, "Initial import");
    assert_eq!(version.sequence, 1);
    assert_eq!(version.violations.len(), 1);
    assert_eq!(version.endpoints.len(), 1);
    assert!(version.completeness.is_complete());
    assert!(version.readme_content.contains("# Architecture Overview"));

    let types: Vec<DiagramType> = version.images_by_type().into_keys().collect();
    assert_eq!(types, DiagramType::ALL.to_vec());
    for image in &version.images {
        let bytes = h.scheduler.load_image(&project.id, &image.image_ref).unwrap();
        assert!(bytes.starts_with(b"digraph"));
    }

    let project = h.scheduler.get_project(&project.id).unwrap();
    assert_eq!(project.last_commit_hash.as_deref(), Some(FIRST));
}

#[tokio::test]
async fn test_known_commit_is_duplicate() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "Initial import"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    analyse(&h, &project, "main").await;
    let calls = h.snapshots.calls();

    // A known hash is answered without taking a snapshot.
    let response = h.scheduler.request_analysis(&project.id, manual(FIRST)).unwrap();
    assert_eq!(response, TriggerResponse::Duplicate);
    assert_eq!(h.snapshots.calls(), calls);

    // A branch resolving to the same commit is detected by the run.
    analyse(&h, &project, "main").await;
    let status = h.scheduler.status(&project.id).unwrap();
    assert!(matches!(status.last_outcome, Some(LastOutcome::Duplicate { .. })));
    assert_eq!(h.scheduler.list_versions(&project.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_forced_reanalysis_supersedes() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "Initial import"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    analyse(&h, &project, "main").await;
    let original = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();

    h.scheduler
        .request_analysis(&project.id, manual(FIRST).forced())
        .unwrap();
    h.scheduler.wait_idle(&project.id).await;

    let versions = h.scheduler.list_versions(&project.id).unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions.iter().any(|v| v.id == original.id && v.superseded));

    let current = h
        .scheduler
        .get_version(&project.id, &VersionSelector::Commit(FIRST[..7].to_string()))
        .unwrap();
    assert_ne!(current.id, original.id);
    assert_eq!(current.sequence, 2);
}

#[tokio::test]
async fn test_one_running_one_pending() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    let clean = clean_gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "first"));
    h.snapshots.add("feature", clean.path(), commit(SECOND, "second"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();
    let gate = h.snapshots.gate();

    let s = &h.scheduler;
    assert_eq!(s.request_analysis(&project.id, manual("main")).unwrap(), TriggerResponse::Accepted);
    assert_eq!(s.request_analysis(&project.id, manual("main")).unwrap(), TriggerResponse::Duplicate);
    assert_eq!(s.request_analysis(&project.id, manual("unknown")).unwrap(), TriggerResponse::Queued);
    assert_eq!(s.request_analysis(&project.id, manual("feature")).unwrap(), TriggerResponse::Queued);

    let status = s.status(&project.id).unwrap();
    assert_eq!(status.state, ProjectState::Analyzing);
    assert_eq!(status.running.as_deref(), Some("main"));
    assert_eq!(status.pending.as_deref(), Some("feature"));

    assert!(matches!(s.delete_project(&project.id).await, Err(SchedulerError::Busy(_))));

    gate.add_permits(2);
    s.wait_idle(&project.id).await;

    // The replaced request never ran.
    assert_eq!(h.snapshots.calls(), 2);
    let versions = s.list_versions(&project.id).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].commit_hash, SECOND);
    assert_eq!(versions[1].commit_hash, FIRST);
}

#[tokio::test]
async fn test_failure_and_retry() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    analyse(&h, &project, "release").await;
    let status = h.scheduler.status(&project.id).unwrap();
    assert_eq!(status.state, ProjectState::Idle);
    match status.last_outcome {
        Some(LastOutcome::Failed { commit_ref, kind, .. }) => {
            assert_eq!(commit_ref, "release");
            assert_eq!(kind, "unresolvable_ref");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(h.scheduler.list_versions(&project.id).unwrap().is_empty());

    h.snapshots.add("release", tree.path(), commit(FIRST, "release"));
    assert_eq!(h.scheduler.retry(&project.id).unwrap(), TriggerResponse::Accepted);
    h.scheduler.wait_idle(&project.id).await;
    assert_eq!(h.scheduler.list_versions(&project.id).unwrap().len(), 1);

    assert!(matches!(
        h.scheduler.retry(&project.id),
        Err(SchedulerError::NothingToRetry(_))
    ));
}

#[tokio::test]
async fn test_rejected_retry_can_be_retried() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();
    analyse(&h, &project, "release").await;

    // The store loses the project behind the scheduler's back.
    h.store.delete_project(&project.id).unwrap();
    assert!(h.scheduler.retry(&project.id).unwrap_err().is_not_found());

    h.store.save_project(&project).unwrap();
    h.snapshots.add("release", tree.path(), commit(FIRST, "release"));
    assert_eq!(h.scheduler.retry(&project.id).unwrap(), TriggerResponse::Accepted);
    h.scheduler.wait_idle(&project.id).await;
    assert_eq!(h.scheduler.list_versions(&project.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_render_failure_keeps_other_diagrams() {
    let h = harness(FakeBackend::failing(&[DiagramType::Api]));
    let tree = gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "first"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    analyse(&h, &project, "main").await;

    let version = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert!(!version.completeness.is_complete());
    assert_eq!(version.completeness.failed_diagram_types(), vec![DiagramType::Api]);
    assert!(!version.images.is_empty());
    assert!(version.images.iter().all(|i| i.diagram_type != DiagramType::Api));
}

#[tokio::test]
async fn test_missing_ontology_leaves_drift_unevaluated() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "first"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    analyse(&h, &project, "main").await;

    let version = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert!(version.violations.is_empty());
    assert!(matches!(version.completeness.drift, DriftStatus::Unevaluated { .. }));
    assert!(version.summary_content.contains("Drift was not evaluated"));
}

#[tokio::test]
async fn test_summary_reports_resolved_violations() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    let clean = clean_gateway_tree();
    h.snapshots.add("v1", tree.path(), commit(FIRST, "first"));
    h.snapshots.add("v2", clean.path(), commit(SECOND, "drop firmware import"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();
    h.scheduler.set_ontology(&project.id, GATEWAY_ONTOLOGY).await.unwrap();

    analyse(&h, &project, "v1").await;
    analyse(&h, &project, "v2").await;

    let latest = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert!(latest.violations.is_empty());
    assert!(latest.summary_content.contains(&format!("Since `{}`", &FIRST[..7])));
    assert!(latest.summary_content.contains("### Resolved violations"));
    assert!(latest.summary_content.contains("[CRITICAL] gateway-isolation: gateway.module"));

    let report = Report::latest(h.store.as_ref(), &project.id).unwrap().to_markdown();
    assert!(report.contains("# Architecture Report: gateway"));
    assert!(report.contains("No architecture violations."));
}

fn users_api(route: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "api.py",
        &format!("from flask import Flask\napp = Flask(__name__)\n\n@app.get(\"{route}\")\ndef list_users():\n    pass\n"),
    );
    dir
}

#[tokio::test]
async fn test_moved_route_is_reported_against_previous_version() {
    let h = harness(FakeBackend::default());
    let before = users_api("/users");
    let after = users_api("/accounts");
    h.snapshots.add("v1", before.path(), commit(FIRST, "first"));
    h.snapshots.add("v2", after.path(), commit(SECOND, "rename route"));
    let project = h.scheduler.create_project("users", "https://example.com/users.git").unwrap();
    h.scheduler.set_ontology(&project.id, "rules: []").await.unwrap();

    analyse(&h, &project, "v1").await;
    let first = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert!(first.violations.is_empty());

    analyse(&h, &project, "v2").await;
    let latest = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert_eq!(latest.violations.len(), 1);
    let v = &latest.violations[0];
    assert_eq!(v.rule_id, baseline::API_PATH_CHANGED);
    assert_eq!(v.severity, Severity::Medium);
    assert_eq!(v.component, "api.list_users");
    assert_eq!(v.actual, vec!["GET /users -> GET /accounts".to_string()]);
    assert!(latest.summary_content.contains("api-path-changed"));
}

#[tokio::test]
async fn test_trigger_payload() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add(FIRST, tree.path(), commit(FIRST, "original message"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    let payload = TriggerPayload::from_json(&format!(
        r#"{{"project_id": "{}", "sha": "{FIRST}", "message": "from hook", "branch": "main"}}"#,
        project.id
    ))
    .unwrap();
    let response = h.scheduler.trigger(payload, TriggerSource::PostCommitHook).unwrap();
    assert_eq!(response, TriggerResponse::Accepted);
    h.scheduler.wait_idle(&project.id).await;

    let version = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert_eq!(version.trigger_source, TriggerSource::PostCommitHook);
    assert_eq!(version.commit_message, "from hook");
    assert_eq!(version.branch.as_deref(), Some("main"));
}

#[tokio::test]
async fn test_unknown_project_is_rejected() {
    let h = harness(FakeBackend::default());
    let err = h.scheduler.request_analysis("missing", manual("main")).unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_option_like_repository_is_rejected() {
    let h = harness(FakeBackend::default());
    let err = h.scheduler.create_project("evil", "--upload-pack=touch pwned").unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidRepository(_)));
    assert!(h.scheduler.list_projects().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_ontology_is_rejected() {
    let h = harness(FakeBackend::default());
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();

    let err = h
        .scheduler
        .set_ontology(&project.id, "rules:\n  - rule_id: bad\n    kind: forbidden_edge\n    source: \"(\"\n    target: x\n")
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Ontology(_)));
    assert!(h.scheduler.ontology(&project.id).await.is_none());

    assert_eq!(h.scheduler.set_ontology(&project.id, GATEWAY_ONTOLOGY).await.unwrap(), 1);
    assert!(h.scheduler.ontology(&project.id).await.is_some());
}

#[tokio::test]
async fn test_delete_cascades() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add("main", tree.path(), commit(FIRST, "first"));
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();
    h.scheduler.set_ontology(&project.id, GATEWAY_ONTOLOGY).await.unwrap();
    analyse(&h, &project, "main").await;
    let image_ref = h
        .scheduler
        .get_version(&project.id, &VersionSelector::Latest)
        .unwrap()
        .images[0]
        .image_ref
        .clone();

    h.scheduler.delete_project(&project.id).await.unwrap();

    assert!(h.scheduler.get_project(&project.id).unwrap_err().is_not_found());
    assert!(h.scheduler.list_versions(&project.id).unwrap_err().is_not_found());
    assert!(h.scheduler.load_image(&project.id, &image_ref).unwrap_err().is_not_found());
    assert!(h.scheduler.ontology(&project.id).await.is_none());
}

#[tokio::test]
async fn test_poller_triggers_on_new_head() {
    let h = harness(FakeBackend::default());
    let tree = gateway_tree();
    h.snapshots.add(FIRST, tree.path(), commit(FIRST, "first"));
    h.snapshots.set_head(FIRST);
    let project = h.scheduler.create_project("gateway", "https://example.com/gw.git").unwrap();
    let poller = Poller::new(h.scheduler.clone(), Duration::from_secs(60));

    let issued = poller.poll_once().await;
    assert_eq!(issued, vec![(project.id.clone(), TriggerResponse::Accepted)]);
    h.scheduler.wait_idle(&project.id).await;

    let version = h.scheduler.get_version(&project.id, &VersionSelector::Latest).unwrap();
    assert_eq!(version.trigger_source, TriggerSource::Poller);

    assert!(poller.poll_once().await.is_empty());
}
