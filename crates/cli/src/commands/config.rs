use anyhow::{Context, Result};
use siteferry_core::Settings;
use std::path::Path;

/// Print the effective settings as TOML, secrets shortened.
pub fn run(config: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config).context("Failed to load settings")?;
    let rendered =
        toml::to_string_pretty(&settings.redacted()).context("Failed to serialize settings")?;
    print!("{}", rendered);
    Ok(())
}
