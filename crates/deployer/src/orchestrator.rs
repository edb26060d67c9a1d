//! Deployment Orchestrator: runs one site through
//! trigger → settle → fetch → upload → cleanup.
//!
//! Runs are fire-and-forget from the receiver's point of view. Every error
//! inside a run is caught here, logged, and recorded in the registry as the
//! run's outcome.

use chrono::Utc;
use siteferry_core::{FetchStrategy, RunOutcome, Settings, SiteId, Stage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::DeployError;
use crate::fetcher::{ExportFetcher, FetchPolicy, SiteMirror};
use crate::mirror::HttpMirror;
use crate::porkbun::PorkbunClient;
use crate::rate_limit::RateLimiter;
use crate::registry::{DeploymentRegistry, RunGuard};
use crate::upload::{FileFilter, UploadClient, UploadPolicy, UploadReport};
use crate::webflow::WebflowClient;

pub struct Deployer {
    registry: Arc<DeploymentRegistry>,
    fetcher: ExportFetcher,
    uploader: UploadClient,
    work_dir: PathBuf,
}

impl Deployer {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        fetcher: ExportFetcher,
        uploader: UploadClient,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            fetcher,
            uploader,
            work_dir,
        }
    }

    /// Wire the production Webflow and Porkbun clients from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, DeployError> {
        let deploy = &settings.deploy;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::new(
            deploy.min_trigger_interval(),
            clock.clone(),
        ));

        let source = WebflowClient::new(
            &settings.source.api_token,
            &settings.source.api_url,
            &settings.source.publish_domain,
        )
        .map_err(|e| DeployError::Configuration(e.to_string()))?;

        let mirror: Option<Arc<dyn SiteMirror>> = match deploy.fetch_strategy {
            FetchStrategy::Export => None,
            FetchStrategy::Mirror | FetchStrategy::ExportThenMirror => Some(Arc::new(
                HttpMirror::new(&settings.source.publish_domain, deploy.mirror_max_pages)
                    .map_err(|e| DeployError::Configuration(e.to_string()))?,
            )),
        };

        let fetcher = ExportFetcher::new(
            Arc::new(source),
            mirror,
            limiter,
            clock.clone(),
            FetchPolicy::from_settings(deploy),
        );

        let transport = PorkbunClient::new(
            &settings.destination.api_key,
            &settings.destination.secret_key,
            &settings.destination.domain,
        )
        .map_err(|e| DeployError::Configuration(e.to_string()))?;

        let filter = if deploy.filter_extensions {
            FileFilter::publishable()
        } else {
            FileFilter::all()
        };

        let uploader = UploadClient::new(
            Arc::new(transport),
            UploadPolicy::from_settings(&settings.destination, deploy),
            filter,
            clock,
        );

        Ok(Self::new(
            Arc::new(DeploymentRegistry::new(deploy.history_limit)),
            fetcher,
            uploader,
            deploy.work_dir(),
        ))
    }

    pub fn registry(&self) -> &Arc<DeploymentRegistry> {
        &self.registry
    }

    /// Claim the site and start its run in the background.
    ///
    /// Returns as soon as the run is spawned; `DuplicateRun` if the site
    /// already has one.
    pub fn dispatch(self: &Arc<Self>, site_id: SiteId) -> Result<(), DeployError> {
        let guard = self
            .registry
            .claim(&site_id)
            .ok_or(DeployError::DuplicateRun(site_id))?;

        let deployer = Arc::clone(self);
        tokio::spawn(async move {
            deployer.execute(guard).await;
        });
        Ok(())
    }

    /// Claim the site and run it to completion on the current task.
    pub async fn run(&self, site_id: SiteId) -> Result<RunOutcome, DeployError> {
        let guard = self
            .registry
            .claim(&site_id)
            .ok_or(DeployError::DuplicateRun(site_id))?;
        Ok(self.execute(guard).await)
    }

    async fn execute(&self, guard: RunGuard) -> RunOutcome {
        let site_id = guard.site_id().clone();
        info!(site_id = %site_id, "Deployment started");

        let outcome = match self.sequence(&guard).await {
            Ok(report) => {
                info!(
                    site_id = %site_id,
                    endpoint = %report.endpoint,
                    files = report.files,
                    round = report.round,
                    "Deployment completed"
                );
                RunOutcome::Succeeded {
                    files: report.files,
                    endpoint: report.endpoint,
                }
            }
            Err(e) => {
                error!(site_id = %site_id, error = %e, "Deployment failed");
                RunOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        guard.finish(outcome.clone());
        outcome
    }

    async fn sequence(&self, guard: &RunGuard) -> Result<UploadReport, DeployError> {
        let site_id = guard.site_id();

        enter(guard, Stage::Triggering);
        self.fetcher.trigger(site_id).await?;

        enter(guard, Stage::Settling);
        self.fetcher.settle().await;

        enter(guard, Stage::Fetching);
        let workspace = self.create_workspace(site_id)?;
        let result = self.transfer(guard, workspace.path()).await;

        enter(guard, Stage::CleaningUp);
        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(
                site_id = %site_id,
                path = %path.display(),
                error = %e,
                "Failed to remove run directory"
            );
        }

        result
    }

    async fn transfer(&self, guard: &RunGuard, workdir: &Path) -> Result<UploadReport, DeployError> {
        let tree = self.fetcher.retrieve(guard.site_id(), workdir).await?;
        enter(guard, Stage::Uploading);
        self.uploader.upload(&tree).await
    }

    /// Timestamped per-run directory, removed when the returned handle is
    /// closed or dropped.
    fn create_workspace(&self, site_id: &SiteId) -> Result<TempDir, DeployError> {
        fs::create_dir_all(&self.work_dir)?;
        let prefix = format!(
            "siteferry_{}_{}_",
            site_id.file_safe(),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        Ok(tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.work_dir)?)
    }
}

fn enter(guard: &RunGuard, stage: Stage) {
    info!(site_id = %guard.site_id(), stage = %stage, "Entering stage");
    guard.set_stage(stage);
}
