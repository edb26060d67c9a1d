//! Upload Client: push a local file tree to the destination platform.
//!
//! The whole tree goes up as one multipart batch. Delivery follows an
//! [`UploadPolicy`]: every round tries each endpoint in order, and only after
//! the whole list has failed does the client back off (`d`, `2d`, `4d`, ...)
//! before the next round.

use async_trait::async_trait;
use siteferry_core::config::{DeploySettings, DestinationSettings};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::clock::Clock;
use crate::error::DeployError;
use crate::fetcher::LocalFileTree;

/// Extensions a static site publishes
pub const PUBLISHABLE_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "mjs", "json", "xml", "txt", "svg", "png", "jpg", "jpeg", "gif",
    "webp", "avif", "ico", "woff", "woff2", "ttf", "otf",
];

/// One file of the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub local_path: PathBuf,
    /// Destination path, always starting with `/`
    pub remote_path: String,
}

/// Failure of a single request to a single endpoint
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AttemptError::Timeout
        } else {
            AttemptError::Transport(err.to_string())
        }
    }
}

/// Sends a batch to one endpoint of the destination platform
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        files: &[UploadFile],
        timeout: Duration,
    ) -> Result<(), AttemptError>;
}

/// Which files of a tree are uploaded.
///
/// Hidden files, and anything under a hidden directory, are always skipped.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    extensions: Option<Vec<String>>,
}

impl FileFilter {
    /// Only the extensions in [`PUBLISHABLE_EXTENSIONS`]
    pub fn publishable() -> Self {
        Self {
            extensions: Some(
                PUBLISHABLE_EXTENSIONS
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
            ),
        }
    }

    /// Every non-hidden file
    pub fn all() -> Self {
        Self { extensions: None }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| allowed.iter().any(|a| *a == ext))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Walk the tree and list the files to upload, sorted by destination path.
pub fn collect_files(
    tree: &LocalFileTree,
    filter: &FileFilter,
) -> std::io::Result<Vec<UploadFile>> {
    let base = tree.content_root();
    let mut files = Vec::new();

    let walker = WalkDir::new(&base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !filter.accepts(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&base)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        files.push(UploadFile {
            local_path: entry.path().to_path_buf(),
            remote_path: remote_path(relative),
        });
    }

    Ok(files)
}

/// Destination path for a tree-relative path: forward slashes, leading `/`.
pub fn remote_path(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

/// Endpoint fallback order and backoff schedule
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub endpoints: Vec<String>,
    pub initial_backoff: Duration,
    pub max_rounds: u32,
    pub request_timeout: Duration,
}

impl UploadPolicy {
    pub fn from_settings(destination: &DestinationSettings, deploy: &DeploySettings) -> Self {
        Self {
            endpoints: destination.endpoints.clone(),
            initial_backoff: deploy.upload_initial_backoff(),
            max_rounds: deploy.upload_max_rounds,
            request_timeout: deploy.upload_timeout(),
        }
    }

    /// Delay after the given (0-indexed) failed round: `initial * 2^round`.
    pub fn backoff_for_round(&self, round: u32) -> Duration {
        let factor = 2u32.checked_pow(round).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }

    /// Every backoff the policy can apply, in order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_rounds.saturating_sub(1)).map(|round| self.backoff_for_round(round))
    }
}

/// Successful delivery details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub endpoint: String,
    pub files: usize,
    /// 1-based round the upload succeeded in
    pub round: u32,
    pub attempts: u32,
}

pub struct UploadClient {
    transport: Arc<dyn UploadTransport>,
    policy: UploadPolicy,
    filter: FileFilter,
    clock: Arc<dyn Clock>,
}

impl UploadClient {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        policy: UploadPolicy,
        filter: FileFilter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            policy,
            filter,
            clock,
        }
    }

    pub async fn upload(&self, tree: &LocalFileTree) -> Result<UploadReport, DeployError> {
        let files = collect_files(tree, &self.filter)?;
        if files.is_empty() {
            return Err(DeployError::ExportUnavailable(
                "no publishable files in site tree".to_string(),
            ));
        }
        let backoff: Vec<Duration> = self.policy.schedule().collect();
        info!(
            files = files.len(),
            endpoints = self.policy.endpoints.len(),
            rounds = self.policy.max_rounds,
            backoff = ?backoff,
            "Uploading site files"
        );

        let endpoints = &self.policy.endpoints;
        let mut attempts = 0;
        let mut last_error = None;

        for round in 0..self.policy.max_rounds {
            for endpoint in endpoints {
                attempts += 1;
                match self
                    .transport
                    .send(endpoint, &files, self.policy.request_timeout)
                    .await
                {
                    Ok(()) => {
                        info!(endpoint = %endpoint, round = round + 1, attempts, "Upload succeeded");
                        return Ok(UploadReport {
                            endpoint: endpoint.clone(),
                            files: files.len(),
                            round: round + 1,
                            attempts,
                        });
                    }
                    Err(e) => {
                        warn!(endpoint = %endpoint, round = round + 1, error = %e, "Upload attempt failed");
                        last_error = Some(e.to_string());
                    }
                }
            }

            if round + 1 < self.policy.max_rounds {
                let delay = self.policy.backoff_for_round(round);
                warn!(
                    round = round + 1,
                    backoff_secs = delay.as_secs(),
                    "All upload endpoints failed, backing off"
                );
                self.clock.sleep(delay).await;
            }
        }

        Err(DeployError::UploadExhausted {
            rounds: self.policy.max_rounds,
            endpoints: endpoints.len(),
            last_error: last_error.unwrap_or_else(|| "no upload endpoints configured".to_string()),
        })
    }
}
