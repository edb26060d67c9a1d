// Webflow API client: publish trigger and site export download

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use siteferry_core::SiteId;
use tracing::debug;

use crate::fetcher::{SourceError, SourcePlatform};

pub struct WebflowClient {
    client: reqwest::Client,
    api_url: String,
    publish_domain: String,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    domains: Vec<&'a str>,
}

impl WebflowClient {
    /// Create new Webflow API client
    pub fn new(api_token: &str, api_url: &str, publish_domain: &str) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_token))
                .map_err(|e| SourceError::Invalid(format!("invalid API token: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            publish_domain: publish_domain.to_string(),
        })
    }

    fn site_url(&self, site_id: &SiteId, action: &str) -> String {
        format!("{}/sites/{}/{}", self.api_url, site_id, action)
    }
}

#[async_trait]
impl SourcePlatform for WebflowClient {
    async fn publish(&self, site_id: &SiteId) -> Result<(), SourceError> {
        let url = self.site_url(site_id, "publish");
        let request = PublishRequest {
            domains: vec![self.publish_domain.as_str()],
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(site_id = %site_id, status = status.as_u16(), "Publish accepted");
        Ok(())
    }

    async fn download_export(&self, site_id: &SiteId) -> Result<Vec<u8>, SourceError> {
        let url = self.site_url(site_id, "export");
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
