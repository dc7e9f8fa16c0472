use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Scheduler, TriggerResponse};
use crate::pipeline::AnalysisRequest;
use crate::version::TriggerSource;

/// Periodically asks each project's remote for its head commit and triggers
/// an analysis when it has moved.
#[derive(Clone)]
pub struct Poller {
    scheduler: Scheduler,
    interval: Duration,
}

impl Poller {
    pub fn new(scheduler: Scheduler, interval: Duration) -> Self {
        Self { scheduler, interval }
    }

    /// Check every project once. Returns the triggers that were issued.
    pub async fn poll_once(&self) -> Vec<(String, TriggerResponse)> {
        let projects = match self.scheduler.list_projects() {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "Could not list projects");
                return Vec::new();
            }
        };

        let mut issued = Vec::new();
        for project in projects {
            let head = match self.scheduler.pipeline().snapshots().remote_head(&project.repo_url).await {
                Ok(head) => head,
                Err(e) => {
                    warn!(project_id = %project.id, error = %e, "Could not resolve remote head");
                    continue;
                }
            };
            if project.last_commit_hash.as_deref() == Some(head.as_str()) {
                debug!(project_id = %project.id, "Up to date");
                continue;
            }

            match self
                .scheduler
                .request_analysis(&project.id, AnalysisRequest::new(head.clone(), TriggerSource::Poller))
            {
                Ok(response) => {
                    info!(project_id = %project.id, head = %head, response = %response, "New commit detected");
                    issued.push((project.id, response));
                }
                Err(e) => warn!(project_id = %project.id, error = %e, "Trigger failed"),
            }
        }
        issued
    }

    /// Poll on every tick until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(interval_secs = self.interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }
}
