//! Export Fetcher: publish the site on the source platform, let the publish
//! settle, then materialise the static file tree locally.

use async_trait::async_trait;
use siteferry_core::config::DeploySettings;
use siteferry_core::{FetchStrategy, SiteId};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::clock::Clock;
use crate::error::DeployError;
use crate::rate_limit::RateLimiter;

/// Failures talking to the source platform or the published site
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited by source platform")]
    RateLimited,

    #[error("source platform returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid export archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Publish/export API of the source hosting platform
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    async fn publish(&self, site_id: &SiteId) -> Result<(), SourceError>;

    /// Fetch the packaged (zip) export of the site
    async fn download_export(&self, site_id: &SiteId) -> Result<Vec<u8>, SourceError>;
}

/// Copies the live published site to disk
#[async_trait]
pub trait SiteMirror: Send + Sync {
    /// Directory name the mirror writes under inside `dest`
    fn host(&self) -> &str;

    /// Mirror into `dest/<host>/`, returning the number of files written
    async fn mirror(&self, dest: &Path) -> Result<usize, SourceError>;
}

/// A retrieved static site on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileTree {
    root: PathBuf,
    host_prefix: Option<String>,
}

impl LocalFileTree {
    pub fn new(root: impl Into<PathBuf>, host_prefix: Option<String>) -> Self {
        Self {
            root: root.into(),
            host_prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host_prefix(&self) -> Option<&str> {
        self.host_prefix.as_deref()
    }

    /// Directory whose contents map onto the destination's document root
    pub fn content_root(&self) -> PathBuf {
        match &self.host_prefix {
            Some(host) => self.root.join(host),
            None => self.root.clone(),
        }
    }

    pub fn file_count(&self) -> usize {
        WalkDir::new(self.content_root())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub settle_delay: Duration,
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
    pub strategy: FetchStrategy,
}

impl FetchPolicy {
    pub fn from_settings(deploy: &DeploySettings) -> Self {
        Self {
            settle_delay: deploy.settle_delay(),
            rate_limit_backoff: deploy.rate_limit_backoff(),
            max_rate_limit_retries: deploy.max_rate_limit_retries,
            strategy: deploy.fetch_strategy,
        }
    }
}

pub struct ExportFetcher {
    source: Arc<dyn SourcePlatform>,
    mirror: Option<Arc<dyn SiteMirror>>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    policy: FetchPolicy,
}

impl ExportFetcher {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        mirror: Option<Arc<dyn SiteMirror>>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            source,
            mirror,
            limiter,
            clock,
            policy,
        }
    }

    /// Trigger, settle and retrieve in one call.
    pub async fn fetch(
        &self,
        site_id: &SiteId,
        workdir: &Path,
    ) -> Result<LocalFileTree, DeployError> {
        self.trigger(site_id).await?;
        self.settle().await;
        self.retrieve(site_id, workdir).await
    }

    /// Ask the source platform to publish, honouring the rate limiter.
    ///
    /// A rate-limit response costs one fixed backoff and another attempt, at
    /// most `max_rate_limit_retries` times.
    pub async fn trigger(&self, site_id: &SiteId) -> Result<(), DeployError> {
        let mut retries = 0;
        loop {
            let result = self
                .limiter
                .run_gated(|| self.source.publish(site_id))
                .await;

            match result {
                Ok(()) => {
                    info!(site_id = %site_id, "Publish triggered");
                    return Ok(());
                }
                Err(SourceError::RateLimited) if retries < self.policy.max_rate_limit_retries => {
                    retries += 1;
                    warn!(
                        site_id = %site_id,
                        retry = retries,
                        backoff_secs = self.policy.rate_limit_backoff.as_secs(),
                        "Source platform rate limit hit, backing off"
                    );
                    self.clock.sleep(self.policy.rate_limit_backoff).await;
                }
                Err(SourceError::RateLimited) => {
                    return Err(DeployError::UpstreamTrigger(format!(
                        "still rate limited after {} retries",
                        retries
                    )));
                }
                Err(e) => return Err(DeployError::UpstreamTrigger(e.to_string())),
            }
        }
    }

    /// Give the remote publish time to complete.
    pub async fn settle(&self) {
        if !self.policy.settle_delay.is_zero() {
            debug!(
                delay_secs = self.policy.settle_delay.as_secs(),
                "Waiting for publish to settle"
            );
            self.clock.sleep(self.policy.settle_delay).await;
        }
    }

    /// Materialise the site's file tree inside `workdir`.
    pub async fn retrieve(
        &self,
        site_id: &SiteId,
        workdir: &Path,
    ) -> Result<LocalFileTree, DeployError> {
        let tree = match self.policy.strategy {
            FetchStrategy::Export => self
                .from_export(site_id, workdir)
                .await
                .map_err(|e| DeployError::ExportUnavailable(e.to_string()))?,
            FetchStrategy::Mirror => self.from_mirror(workdir).await?,
            FetchStrategy::ExportThenMirror => match self.from_export(site_id, workdir).await {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(
                        site_id = %site_id,
                        error = %e,
                        "Export download failed, falling back to mirror"
                    );
                    self.from_mirror(workdir).await?
                }
            },
        };

        let files = tree.file_count();
        let root = tree.content_root();
        if files == 0 {
            return Err(DeployError::ExportUnavailable(format!(
                "no files found in {}",
                root.display()
            )));
        }

        info!(site_id = %site_id, files, root = %root.display(), "Site files retrieved");
        Ok(tree)
    }

    async fn from_export(
        &self,
        site_id: &SiteId,
        workdir: &Path,
    ) -> Result<LocalFileTree, SourceError> {
        let bytes = self.source.download_export(site_id).await?;
        let root = workdir.join("export");
        let entries = extract_archive(&bytes, &root)?;
        debug!(site_id = %site_id, entries, "Export archive extracted");

        let tree = LocalFileTree::new(unwrap_single_dir(&root)?, None);
        if tree.file_count() == 0 {
            return Err(SourceError::Invalid(
                "export archive contained no files".to_string(),
            ));
        }
        Ok(tree)
    }

    async fn from_mirror(&self, workdir: &Path) -> Result<LocalFileTree, DeployError> {
        let mirror = self.mirror.as_ref().ok_or_else(|| {
            DeployError::ExportUnavailable("no site mirror configured".to_string())
        })?;

        let root = workdir.join("mirror");
        let files = mirror
            .mirror(&root)
            .await
            .map_err(|e| DeployError::ExportUnavailable(format!("mirror failed: {}", e)))?;
        debug!(host = mirror.host(), files, "Site mirrored");

        Ok(LocalFileTree::new(root, Some(mirror.host().to_string())))
    }
}

/// Expand a zip archive into `dest`, returning the number of entries.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<usize, SourceError> {
    fs::create_dir_all(dest)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    archive.extract(dest)?;
    Ok(archive.len())
}

/// Exports are sometimes wrapped in one top-level folder; descend into it.
fn unwrap_single_dir(root: &Path) -> Result<PathBuf, SourceError> {
    let entries: Vec<_> = fs::read_dir(root)?.collect::<Result<_, _>>()?;
    if let [only] = entries.as_slice()
        && only.file_type()?.is_dir()
    {
        return Ok(only.path());
    }
    Ok(root.to_path_buf())
}
