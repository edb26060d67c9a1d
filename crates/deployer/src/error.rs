//! Error taxonomy for deployment runs.

use siteferry_core::SiteId;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The source platform refused or failed the publish trigger
    #[error("publish trigger failed: {0}")]
    UpstreamTrigger(String),

    /// No file tree could be obtained after publishing
    #[error("export unavailable: {0}")]
    ExportUnavailable(String),

    /// Every endpoint failed in every retry round
    #[error("upload failed after {rounds} round(s) across {endpoints} endpoint(s): {last_error}")]
    UploadExhausted {
        rounds: u32,
        endpoints: usize,
        last_error: String,
    },

    /// A run for this site is already active
    #[error("deployment already in progress for site {0}")]
    DuplicateRun(SiteId),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl DeployError {
    /// Whether this error describes a rejected request rather than a failed run.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DeployError::DuplicateRun(_))
    }
}
