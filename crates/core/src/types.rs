use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a site on the source platform.
///
/// Opaque to us; the only rule is that it is non-empty once trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    /// Parse a raw identifier, trimming surrounding whitespace.
    /// Returns `None` for empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A filesystem-safe rendering for temp directory names
    pub fn file_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SiteId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SiteId::parse(&value).ok_or_else(|| "site id must not be empty".to_string())
    }
}

impl From<SiteId> for String {
    fn from(id: SiteId) -> Self {
        id.0
    }
}

/// Stage of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Triggering,
    Settling,
    Fetching,
    Uploading,
    CleaningUp,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Triggering => "triggering",
            Stage::Settling => "settling",
            Stage::Fetching => "fetching",
            Stage::Uploading => "uploading",
            Stage::CleaningUp => "cleaning_up",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a deployment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded { files: usize, endpoint: String },
    Failed { error: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }
}

/// One execution of the deployment sequence for a site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRun {
    pub site_id: SiteId,
    pub started_at: DateTime<Utc>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

impl DeploymentRun {
    pub fn new(site_id: SiteId) -> Self {
        Self {
            site_id,
            started_at: Utc::now(),
            stage: Stage::Triggering,
            finished_at: None,
            outcome: None,
        }
    }

    /// Close the run with its outcome. The stage follows the outcome.
    pub fn finish(&mut self, outcome: RunOutcome) {
        self.stage = if outcome.is_success() {
            Stage::Done
        } else {
            Stage::Failed
        };
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// How the static file tree is obtained from the source platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Download the packaged export archive
    Export,
    /// Crawl the published site over HTTP
    Mirror,
    /// Try the export archive, fall back to the mirror
    #[default]
    ExportThenMirror,
}

impl FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "export" => Ok(FetchStrategy::Export),
            "mirror" => Ok(FetchStrategy::Mirror),
            "export-then-mirror" | "export_then_mirror" => Ok(FetchStrategy::ExportThenMirror),
            other => Err(format!(
                "unknown fetch strategy '{}', expected export, mirror or export-then-mirror",
                other
            )),
        }
    }
}
