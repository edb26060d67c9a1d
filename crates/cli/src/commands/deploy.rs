use anyhow::{Context, Result, bail};
use siteferry_core::{RunOutcome, Settings, SiteId};
use siteferry_deployer::Deployer;
use std::path::Path;

/// Deploy one site synchronously; fails if the run fails.
pub async fn run(config: Option<&Path>, site_id: &str) -> Result<()> {
    let site_id = SiteId::parse(site_id).context("Site ID must not be empty")?;
    let settings = Settings::load(config).context("Failed to load settings")?;
    let deployer = Deployer::from_settings(&settings).context("Failed to set up deployer")?;

    println!("🚀 Deploying {} to {}", site_id, settings.destination.domain);

    match deployer.run(site_id.clone()).await? {
        RunOutcome::Succeeded { files, endpoint } => {
            println!("✅ Uploaded {} files via {}", files, endpoint);
            Ok(())
        }
        RunOutcome::Failed { error } => bail!("Deployment of {} failed: {}", site_id, error),
    }
}
