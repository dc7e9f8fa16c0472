//! Command handlers.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use archdrift_core::extract::Extractor;
use archdrift_core::ontology::CompiledOntology;
use archdrift_core::scheduler::{LastOutcome, Poller};
use archdrift_core::snapshot::DirectorySnapshotProvider;
use archdrift_core::storage::VersionStore;
use archdrift_core::version::{short_hash, DiagramVersion};
use archdrift_core::{
    AnalysisRequest, Config, FileVersionStore, Pipeline, Project, Renderer, Report, Scheduler, TriggerPayload,
    TriggerResponse, TriggerSource, VersionSelector,
};
use chrono::Local;
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

pub struct App {
    scheduler: Scheduler,
    store: Arc<FileVersionStore>,
}

impl App {
    pub fn build(config: &Config, working_tree: bool) -> Result<Self> {
        let store = Arc::new(FileVersionStore::from_config(&config.storage));
        debug!(root = %store.root().display(), working_tree, "Opening version store");
        let shared: Arc<dyn VersionStore> = store.clone();
        let pipeline = if working_tree {
            Pipeline::new(
                Arc::new(DirectorySnapshotProvider::new(config.snapshot.git_binary.clone())),
                Arc::new(Extractor::new(config.extraction.clone())),
                Renderer::from_config(config)?,
                shared,
            )
        } else {
            Pipeline::from_config(config, shared)?
        };
        Ok(Self {
            scheduler: Scheduler::new(pipeline),
            store,
        })
    }

    /// Find a project by id, then by unique name.
    fn project(&self, key: &str) -> Result<Project> {
        let projects = self.scheduler.list_projects()?;
        if let Some(project) = projects.iter().find(|p| p.id == key) {
            return Ok(project.clone());
        }
        let mut named = projects.into_iter().filter(|p| p.name == key);
        match (named.next(), named.next()) {
            (Some(project), None) => Ok(project),
            (Some(_), Some(_)) => bail!("several projects are named '{key}', use the project id"),
            (None, _) => bail!("no project '{key}'"),
        }
    }

    pub fn add_project(&self, name: &str, repo_url: &str) -> Result<()> {
        let project = self.scheduler.create_project(name, repo_url)?;
        println!("Created project: {}", project.name);
        println!("  ID: {}", project.id);
        println!("  Repository: {}", project.repo_url);
        Ok(())
    }

    pub fn list_projects(&self) -> Result<()> {
        let projects = self.scheduler.list_projects()?;
        if projects.is_empty() {
            println!("No projects. Use 'archdrift project add <name> <repo>' to register one.");
            return Ok(());
        }
        for project in projects {
            let last = project.last_commit_hash.as_deref().map(short_hash).unwrap_or("-");
            println!("{}  {:<24} {:<8} {}", project.id, project.name, last, project.repo_url);
        }
        Ok(())
    }

    pub async fn remove_project(&self, key: &str) -> Result<()> {
        let project = self.project(key)?;
        self.scheduler.delete_project(&project.id).await?;
        println!("Removed project {}", project.name);
        Ok(())
    }

    pub async fn set_ontology(&self, key: &str, file: &Path) -> Result<()> {
        let project = self.project(key)?;
        let yaml = std::fs::read_to_string(file).wrap_err_with(|| format!("reading {}", file.display()))?;
        let rules = self.scheduler.set_ontology(&project.id, &yaml).await?;
        println!("Installed {rules} rule(s) for {}", project.name);
        Ok(())
    }

    pub async fn show_ontology(&self, key: &str) -> Result<()> {
        let project = self.project(key)?;
        match self.scheduler.ontology(&project.id).await {
            Some(ontology) => print!("{}", ontology.source().to_yaml()?),
            None => println!("No rules installed for {}", project.name),
        }
        Ok(())
    }

    pub async fn analyze(&self, key: &str, commit: &str, force: bool, wait: bool) -> Result<()> {
        let project = self.project(key)?;
        let mut request = AnalysisRequest::new(commit, TriggerSource::Manual);
        request.force = force;
        let response = self.scheduler.request_analysis(&project.id, request)?;
        self.follow(&project, commit, response, wait).await
    }

    pub async fn trigger(&self, payload: &str, source: TriggerSource, wait: bool) -> Result<()> {
        let json = if payload == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).wrap_err("reading payload from stdin")?;
            buf
        } else {
            std::fs::read_to_string(payload).wrap_err_with(|| format!("reading {payload}"))?
        };
        let payload = TriggerPayload::from_json(&json).wrap_err("parsing trigger payload")?;
        let project = self.project(&payload.project_id)?;
        let commit_ref = payload.commit_ref().to_string();
        let payload = TriggerPayload {
            project_id: project.id.clone(),
            ..payload
        };
        let response = self.scheduler.trigger(payload, source)?;
        self.follow(&project, &commit_ref, response, wait).await
    }

    async fn follow(&self, project: &Project, commit_ref: &str, response: TriggerResponse, wait: bool) -> Result<()> {
        println!("{response}");
        if !wait || response == TriggerResponse::Duplicate {
            return Ok(());
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
        spinner.set_message(format!("Analysing {} at {commit_ref}", project.name));
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.scheduler.wait_idle(&project.id).await;
        spinner.finish_and_clear();

        match self.scheduler.status(&project.id)?.last_outcome {
            Some(LastOutcome::Persisted { version_id, commit_hash }) => {
                let version = self
                    .scheduler
                    .get_version(&project.id, &VersionSelector::Commit(commit_hash))?;
                println!("Stored version {version_id}");
                print_version(&version);
                Ok(())
            }
            Some(LastOutcome::Duplicate { commit_hash, .. }) => {
                println!("Commit {} was already analysed", short_hash(&commit_hash));
                Ok(())
            }
            Some(LastOutcome::Failed { commit_ref, kind, reason }) => {
                Err(eyre!("analysis of {commit_ref} failed ({kind}): {reason}"))
            }
            None => Ok(()),
        }
    }

    pub fn status(&self, key: &str, json: bool) -> Result<()> {
        let project = self.project(key)?;
        let status = self.scheduler.status(&project.id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        println!("{}: {:?}", project.name, status.state);
        if let Some(running) = &status.running {
            println!("  Running: {running}");
        }
        if let Some(pending) = &status.pending {
            println!("  Pending: {pending}");
        }
        Ok(())
    }

    pub fn versions(&self, key: &str, json: bool) -> Result<()> {
        let project = self.project(key)?;
        let versions = self.scheduler.list_versions(&project.id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&versions)?);
            return Ok(());
        }
        if versions.is_empty() {
            println!("No versions yet for {}", project.name);
        }
        for v in versions {
            let marker = if v.superseded { " (superseded)" } else { "" };
            let drift = match v.highest_severity {
                Some(severity) => format!("{} violation(s), worst {severity}", v.violation_count),
                None => "no violations".to_string(),
            };
            println!(
                "#{:<4} {} {}  {}  {}, {} image(s){}{}",
                v.sequence,
                v.short_hash(),
                v.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                v.commit_message,
                drift,
                v.image_count,
                if v.complete { "" } else { ", incomplete" },
                marker
            );
        }
        Ok(())
    }

    pub fn show(&self, key: &str, selector: &str, json: bool) -> Result<()> {
        let project = self.project(key)?;
        let selector: VersionSelector = selector.parse()?;
        let version = self.scheduler.get_version(&project.id, &selector)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&version)?);
        } else {
            print_version(&version);
            println!();
            println!("{}", version.summary_content);
        }
        Ok(())
    }

    pub fn report(&self, key: &str, out: Option<&Path>) -> Result<()> {
        let project = self.project(key)?;
        let report = Report::latest(self.store.as_ref(), &project.id)?;
        let markdown = report.to_markdown();
        match out {
            Some(path) => {
                std::fs::write(path, markdown).wrap_err_with(|| format!("writing {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
            None => print!("{markdown}"),
        }
        Ok(())
    }

    pub async fn poll(&self, config: &Config, interval: Option<u64>, once: bool) -> Result<()> {
        let interval = interval.map(Duration::from_secs).unwrap_or(config.scheduler.poll_interval());
        let poller = Poller::new(self.scheduler.clone(), interval);
        if once {
            for (project_id, response) in poller.poll_once().await {
                println!("{project_id}: {response}");
                self.scheduler.wait_idle(&project_id).await;
            }
            return Ok(());
        }
        poller
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
        Ok(())
    }
}

/// Validate a rules file and list what it declares.
pub fn check_ontology(file: &Path) -> Result<()> {
    let yaml = std::fs::read_to_string(file).wrap_err_with(|| format!("reading {}", file.display()))?;
    let ontology = CompiledOntology::from_yaml(&yaml).wrap_err_with(|| format!("invalid rules in {}", file.display()))?;
    println!("{}: {} rule(s)", file.display(), ontology.rules().len());
    for rule in ontology.rules() {
        println!("  {:<10} {:<24} {}", rule.severity.as_str(), rule.rule_id, rule.kind.as_str());
    }
    Ok(())
}

fn print_version(version: &DiagramVersion) {
    println!("Commit: {} ({})", version.commit_hash, version.trigger_source);
    if !version.commit_message.is_empty() {
        println!("  Message: {}", version.commit_message);
    }
    println!("  Created: {}", version.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
    println!("  Images: {}", version.images.len());
    for (diagram_type, images) in version.images_by_type() {
        println!("    {diagram_type}: {}", images.len());
    }
    println!("  Violations: {}", version.violations.len());
    for violation in &version.violations {
        println!("    [{}] {}: {}", violation.severity, violation.rule_id, violation.component);
    }
    let missing = version.completeness.failed_diagram_types();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|t| t.to_string()).collect();
        println!("  Missing diagrams: {}", names.join(", "));
    }
    for failure in &version.completeness.render_failures {
        println!("    {}: {}", failure.diagram_type, failure.reason);
    }
    if !version.completeness.drift.is_evaluated() {
        println!("  Drift not evaluated");
    }
}
