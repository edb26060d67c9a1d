use crate::error::{Error, Result};
use crate::types::FetchStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WEBFLOW_API_URL: &str = "https://api.webflow.com";

/// Upload endpoints accepted by Porkbun static hosting, in preference order
pub const DEFAULT_UPLOAD_ENDPOINTS: &[&str] = &[
    "https://porkbun.com/api/json/v3/hosting/upload",
    "https://api.porkbun.com/api/json/v3/hosting/upload",
    "https://porkbun.com/api/json/v3/static/upload",
];

/// Fully resolved runtime settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub destination: DestinationSettings,
    pub deploy: DeploySettings,
    pub server: ServerSettings,
}

/// Webflow (source platform) access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub api_token: String,
    pub api_url: String,
    /// Domain the site is published to, e.g. "my-site.webflow.io"
    pub publish_domain: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            api_url: DEFAULT_WEBFLOW_API_URL.to_string(),
            publish_domain: String::new(),
        }
    }
}

/// Porkbun (destination platform) access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationSettings {
    pub api_key: String,
    pub secret_key: String,
    pub domain: String,
    pub endpoints: Vec<String>,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            domain: String::new(),
            endpoints: DEFAULT_UPLOAD_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Timing and retry policy for deployment runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub min_trigger_interval_secs: u64,
    pub rate_limit_backoff_secs: u64,
    pub max_rate_limit_retries: u32,
    pub settle_delay_secs: u64,
    pub fetch_strategy: FetchStrategy,
    pub mirror_max_pages: usize,
    pub filter_extensions: bool,
    pub upload_initial_backoff_secs: u64,
    pub upload_max_rounds: u32,
    pub upload_timeout_secs: u64,
    pub history_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            min_trigger_interval_secs: 60,
            rate_limit_backoff_secs: 60,
            max_rate_limit_retries: 5,
            settle_delay_secs: 10,
            fetch_strategy: FetchStrategy::default(),
            mirror_max_pages: 500,
            filter_extensions: true,
            upload_initial_backoff_secs: 5,
            upload_max_rounds: 3,
            upload_timeout_secs: 300,
            history_limit: 50,
            work_dir: None,
        }
    }
}

impl DeploySettings {
    pub fn min_trigger_interval(&self) -> Duration {
        Duration::from_secs(self.min_trigger_interval_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn upload_initial_backoff(&self) -> Duration {
        Duration::from_secs(self.upload_initial_backoff_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Directory that holds per-run temporary trees
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Webhook listener address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides read through `lookup`, then validate.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                parse_settings_str(&content)?
            }
            None => Settings::default(),
        };
        settings.apply_env(lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings using the process environment
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        Settings::load_with(path, |key| std::env::var(key).ok())
    }

    /// Override fields from environment variables.
    /// Blank values are ignored so an empty `.env` entry never wipes a file value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("WEBFLOW_TOKEN") {
            self.source.api_token = v;
        }
        if let Some(v) = get("WEBFLOW_API_URL") {
            self.source.api_url = v;
        }
        if let Some(v) = get("WEBFLOW_DOMAIN") {
            self.source.publish_domain = v;
        }
        if let Some(v) = get("PORKBUN_API_KEY") {
            self.destination.api_key = v;
        }
        if let Some(v) = get("PORKBUN_SECRET_KEY") {
            self.destination.secret_key = v;
        }
        if let Some(v) = get("DEPLOY_DOMAIN") {
            self.destination.domain = v;
        }
        if let Some(v) = get("PORKBUN_UPLOAD_URLS") {
            self.destination.endpoints = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("SITEFERRY_WORK_DIR") {
            self.deploy.work_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SITEFERRY_FETCH_STRATEGY") {
            self.deploy.fetch_strategy = v.parse().map_err(Error::ConfigParse)?;
        }
        if let Some(v) = get("SITEFERRY_MIN_TRIGGER_INTERVAL_SECS") {
            self.deploy.min_trigger_interval_secs =
                parse_number(&v, "SITEFERRY_MIN_TRIGGER_INTERVAL_SECS")?;
        }
        if let Some(v) = get("SITEFERRY_SETTLE_DELAY_SECS") {
            self.deploy.settle_delay_secs = parse_number(&v, "SITEFERRY_SETTLE_DELAY_SECS")?;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_number(&v, "PORT")?;
        }

        Ok(())
    }

    /// Check that everything a deployment needs is present
    pub fn validate(&self) -> Result<()> {
        require(&self.source.api_token, "source.api_token (WEBFLOW_TOKEN)")?;
        require(&self.source.publish_domain, "source.publish_domain (WEBFLOW_DOMAIN)")?;
        require(&self.destination.api_key, "destination.api_key (PORKBUN_API_KEY)")?;
        require(
            &self.destination.secret_key,
            "destination.secret_key (PORKBUN_SECRET_KEY)",
        )?;
        require(&self.destination.domain, "destination.domain (DEPLOY_DOMAIN)")?;

        if self.destination.endpoints.is_empty() {
            return Err(Error::InvalidData(
                "destination.endpoints must list at least one upload URL".to_string(),
            ));
        }
        if self.deploy.upload_max_rounds == 0 {
            return Err(Error::InvalidData(
                "deploy.upload_max_rounds must be at least 1".to_string(),
            ));
        }
        if self.deploy.mirror_max_pages == 0 {
            return Err(Error::InvalidData(
                "deploy.mirror_max_pages must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy of the settings safe to print: secrets are shortened
    pub fn redacted(&self) -> Settings {
        let mut copy = self.clone();
        copy.source.api_token = redact(&copy.source.api_token);
        copy.destination.api_key = redact(&copy.destination.api_key);
        copy.destination.secret_key = redact(&copy.destination.secret_key);
        copy
    }
}

/// Parse settings from a TOML string (useful for testing)
pub fn parse_settings_str(content: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(content)?;
    Ok(settings)
}

fn require(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidData(format!(
            "Missing required setting '{}'",
            field_name
        )));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ConfigParse(format!("Invalid number in {}: '{}'", key, value)))
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}...", prefix)
}
