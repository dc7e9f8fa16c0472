//! Portable report of a project's latest analysis.

use crate::graph::{EdgeKind, NodeKind};
use crate::storage::{StorageError, VersionSelector, VersionStore};
use crate::summary::nouns;
use crate::version::{DiagramVersion, DriftStatus, Project};

/// A read-only view of one version, formatted for export.
#[derive(Debug, Clone)]
pub struct Report {
    pub project: Project,
    pub version: DiagramVersion,
}

impl Report {
    pub fn new(project: Project, version: DiagramVersion) -> Self {
        Self { project, version }
    }

    /// Report for the latest live version of a project.
    pub fn latest(store: &dyn VersionStore, project_id: &str) -> Result<Self, StorageError> {
        let project = store.load_project(project_id)?;
        let version = store.find_version(project_id, &VersionSelector::Latest)?;
        Ok(Self::new(project, version))
    }

    /// Renders the report as a self-contained Markdown document.
    pub fn to_markdown(&self) -> String {
        let v = &self.version;
        let stats = &v.graph_stats;
        let mut md = String::new();

        md.push_str(&format!("# Architecture Report: {}\n\n", self.project.name));
        md.push_str(&format!("- **Repository:** {}\n", self.project.repo_url));
        md.push_str(&format!("- **Commit:** `{}`", v.commit_hash));
        if let Some(branch) = &v.branch {
            md.push_str(&format!(" on `{branch}`"));
        }
        md.push('\n');
        if !v.commit_message.is_empty() {
            md.push_str(&format!("- **Message:** {}\n", v.commit_message));
        }
        if !v.author.is_empty() {
            md.push_str(&format!("- **Author:** {}\n", v.author));
        }
        md.push_str(&format!(
            "- **Analysed:** {} ({})\n\n",
            v.created_at.format("%Y-%m-%d %H:%M UTC"),
            v.trigger_source
        ));

        md.push_str("## Structure\n\n");
        md.push_str("| Element | Count |\n|---------|-------|\n");
        for kind in NodeKind::ALL {
            md.push_str(&format!("| {} | {} |\n", nouns(kind.as_str()), stats.nodes(kind)));
        }
        for kind in EdgeKind::ALL {
            md.push_str(&format!("| {} edges | {} |\n", kind.as_str(), stats.edges(kind)));
        }
        md.push_str(&format!("| external modules | {} |\n", stats.external_modules));
        md.push_str(&format!("| files parsed | {} |\n\n", stats.files_parsed));

        if !v.summary_content.trim().is_empty() {
            md.push_str(&demote_headings(&v.summary_content));
            md.push_str("\n\n");
        }

        md.push_str("## Endpoint Inventory\n\n");
        if v.endpoints.is_empty() {
            md.push_str("No endpoints detected.\n\n");
        } else {
            md.push_str("| Method | Path | Handler | Module | Location | Framework |\n");
            md.push_str("|--------|------|---------|--------|----------|-----------|\n");
            for ep in &v.endpoints {
                md.push_str(&format!(
                    "| {} | `{}` | {} | {} | {}:{} | {} |\n",
                    ep.method, ep.path, ep.handler, ep.module, ep.file, ep.line, ep.framework
                ));
            }
            md.push('\n');
        }

        md.push_str("## Violations\n\n");
        match &v.completeness.drift {
            DriftStatus::Unevaluated { reason } => {
                md.push_str(&format!("Drift was not evaluated: {reason}.\n\n"));
            }
            DriftStatus::Evaluated if v.violations.is_empty() => {
                md.push_str("No architecture violations.\n\n");
            }
            DriftStatus::Evaluated => {
                for violation in &v.violations {
                    md.push_str(&format!(
                        "### [{}] {}: {}\n\n",
                        violation.severity, violation.rule_id, violation.component
                    ));
                    md.push_str(&format!("- **Expected:** {}\n", violation.expected));
                    for instance in &violation.actual {
                        md.push_str(&format!("- **Observed:** {instance}\n"));
                    }
                    md.push_str(&format!("- **Why:** {}\n", violation.explanation));
                    md.push_str(&format!("- **Fix:** {}\n\n", violation.suggested_fix));
                }
            }
        }

        md.push_str("## Diagrams\n\n");
        for (diagram_type, images) in v.images_by_type() {
            for image in images {
                md.push_str(&format!("- {} (`{}`): `{}`\n", image.description, diagram_type, image.image_ref));
            }
        }
        for failure in &v.completeness.render_failures {
            md.push_str(&format!(
                "- {} failed to render: {}\n",
                failure.subject.as_deref().unwrap_or(failure.diagram_type.as_str()),
                failure.reason
            ));
        }

        if !v.completeness.parse_failures.is_empty() {
            md.push_str("\n## Files Not Analysed\n\n");
            for failure in &v.completeness.parse_failures {
                md.push_str(&format!("- `{}`: {}\n", failure.file, failure.reason));
            }
        }

        md
    }
}

/// Push every Markdown heading one level down so embedded text nests under
/// the report's own sections.
fn demote_headings(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with('#') {
                format!("#{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{Severity, Violation};
    use crate::graph::{EndpointRecord, GraphDigest, GraphStats};
    use crate::render::{DiagramType, RenderFailure};
    use crate::version::{Completeness, DiagramImage, TriggerSource};

    fn version() -> DiagramVersion {
        DiagramVersion {
            id: "v1".into(),
            project_id: "p1".into(),
            sequence: 1,
            commit_hash: "abcdef1234567890".into(),
            commit_message: "Add checkout".into(),
            author: "sam".into(),
            branch: Some("main".into()),
            trigger_source: TriggerSource::Webhook,
            created_at: chrono::Utc::now(),
            readme_content: String::new(),
            summary_content: "# Summary\n\nBaseline analysis.".into(),
            images: vec![DiagramImage {
                id: "i1".into(),
                diagram_type: DiagramType::Dependency,
                subject: None,
                description: "Dependency Diagram".into(),
                image_ref: "v1/i1.png".into(),
                media_type: "image/png".into(),
            }],
            violations: vec![Violation {
                id: Violation::id_for("no-cycle", "a, b"),
                rule_id: "no-cycle".into(),
                severity: Severity::High,
                component: "a, b".into(),
                expected: "no cycles".into(),
                actual: vec!["a -> b -> a".into()],
                explanation: "cycle".into(),
                suggested_fix: "break it".into(),
            }],
            superseded: false,
            graph_stats: GraphStats::default(),
            graph_digest: GraphDigest::default(),
            endpoints: vec![EndpointRecord {
                method: "POST".into(),
                path: "/checkout".into(),
                handler: "checkout".into(),
                module: "shop.views".into(),
                file: "shop/views.py".into(),
                line: 12,
                framework: "flask".into(),
            }],
            completeness: Completeness {
                render_failures: vec![RenderFailure {
                    diagram_type: DiagramType::Api,
                    subject: None,
                    reason: "dot crashed".into(),
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_markdown_sections() {
        let project = Project::new("shop", "https://example.com/shop.git");
        let md = Report::new(project, version()).to_markdown();

        assert!(md.starts_with("# Architecture Report: shop\n"));
        assert!(md.contains("- **Commit:** `abcdef1234567890` on `main`"));
        assert!(md.contains("## Summary\n\nBaseline analysis."));
        assert!(md.contains("| POST | `/checkout` | checkout | shop.views | shop/views.py:12 | flask |"));
        assert!(md.contains("### [HIGH] no-cycle: a, b"));
        assert!(md.contains("- **Observed:** a -> b -> a"));
        assert!(md.contains("- Dependency Diagram (`dependency`): `v1/i1.png`"));
        assert!(md.contains("- api failed to render: dot crashed"));
    }

    #[test]
    fn test_unevaluated_drift() {
        let mut v = version();
        v.completeness.drift = DriftStatus::Unevaluated {
            reason: "no ontology configured".into(),
        };
        let md = Report::new(Project::new("x", "/tmp/x"), v).to_markdown();
        assert!(md.contains("Drift was not evaluated: no ontology configured."));
    }
}
