// Deployment pipeline: Webflow publish/export in, Porkbun static hosting out

pub mod clock;
pub mod error;
pub mod fetcher;
pub mod mirror;
pub mod orchestrator;
pub mod porkbun;
pub mod rate_limit;
pub mod registry;
pub mod upload;
pub mod webflow;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, SystemClock};
pub use error::DeployError;
pub use fetcher::{ExportFetcher, FetchPolicy, LocalFileTree, SiteMirror, SourceError, SourcePlatform};
pub use orchestrator::Deployer;
pub use rate_limit::RateLimiter;
pub use registry::{DeploymentRegistry, RegistrySnapshot, RunGuard};
pub use upload::{FileFilter, UploadClient, UploadPolicy, UploadReport, UploadTransport};
