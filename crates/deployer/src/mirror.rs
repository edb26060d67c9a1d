//! Breadth-first HTTP mirror of the published site, used when no export
//! archive is available.
//!
//! Only same-origin links found in `href`/`src` attributes are followed. Pages
//! served as HTML without a file extension are stored as `<path>/index.html`
//! so the mirrored tree serves the same URLs from a static host.

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::fetcher::{SiteMirror, SourceError};

/// Elements and the attribute carrying their link
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("source[src]", "src"),
];

pub struct HttpMirror {
    client: reqwest::Client,
    start: Url,
    host: String,
    max_pages: usize,
}

impl HttpMirror {
    /// `site` is either a bare domain (`example.webflow.io`) or a full URL.
    pub fn new(site: &str, max_pages: usize) -> Result<Self, SourceError> {
        let raw = if site.contains("://") {
            site.to_string()
        } else {
            format!("https://{}/", site.trim_end_matches('/'))
        };
        let start = Url::parse(&raw)
            .map_err(|e| SourceError::Invalid(format!("invalid site URL '{}': {}", raw, e)))?;
        let host = start
            .host_str()
            .ok_or_else(|| SourceError::Invalid(format!("site URL '{}' has no host", raw)))?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            start,
            host,
            max_pages,
        })
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host.as_str())
            && url.port_or_known_default() == self.start.port_or_known_default()
    }

    /// Fetch one URL, write it under `host_dir`, and return its body when it
    /// is an HTML page.
    async fn save(&self, url: &Url, host_dir: &Path) -> Result<Option<String>, SourceError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/html"));
        let bytes = response.bytes().await?;

        let target = host_dir.join(local_path_for(url, is_html));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        debug!(url = %url, path = %target.display(), "Mirrored");

        Ok(is_html.then(|| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[async_trait]
impl SiteMirror for HttpMirror {
    fn host(&self) -> &str {
        &self.host
    }

    async fn mirror(&self, dest: &Path) -> Result<usize, SourceError> {
        let host_dir = dest.join(&self.host);
        tokio::fs::create_dir_all(&host_dir).await?;

        let mut queue = VecDeque::from([self.start.clone()]);
        let mut seen = HashSet::from([self.start.to_string()]);
        let mut written = 0;

        while let Some(url) = queue.pop_front() {
            if written >= self.max_pages {
                warn!(max_pages = self.max_pages, "Mirror page limit reached");
                break;
            }

            let page = match self.save(&url, &host_dir).await {
                Ok(page) => page,
                // The entry page must exist; anything else is a broken link
                Err(e) if url == self.start => return Err(e),
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping unreachable resource");
                    continue;
                }
            };
            written += 1;

            let Some(html) = page else { continue };
            for link in extract_links(&url, &html) {
                if self.same_origin(&link) && seen.insert(link.to_string()) {
                    queue.push_back(link);
                }
            }
        }

        Ok(written)
    }
}

/// Absolute http(s) URLs referenced by a page, without fragments or queries.
fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for (selector, attr) in LINK_SOURCES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            let Ok(mut url) = base.join(value.trim()) else {
                continue;
            };
            if !matches!(url.scheme(), "http" | "https") {
                continue;
            }
            url.set_fragment(None);
            url.set_query(None);
            links.push(url);
        }
    }

    links
}

/// Relative file path a mirrored URL is stored at.
pub fn local_path_for(url: &Url, is_html: bool) -> PathBuf {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..").collect())
        .unwrap_or_default();

    let mut path: PathBuf = segments.iter().collect();
    let directory_like = segments.is_empty() || url.path().ends_with('/');
    let extensionless = Path::new(segments.last().copied().unwrap_or_default())
        .extension()
        .is_none();

    if directory_like || (is_html && extensionless) {
        path.push("index.html");
    }
    path
}
