// Porkbun static hosting client: multipart upload of a site batch

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::upload::{AttemptError, UploadFile, UploadTransport};

pub struct PorkbunClient {
    client: reqwest::Client,
    api_key: String,
    secret_key: String,
    domain: String,
}

/// Porkbun API response envelope
#[derive(Debug, Deserialize)]
struct PorkbunResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl PorkbunClient {
    pub fn new(api_key: &str, secret_key: &str, domain: &str) -> Result<Self, AttemptError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Build the multipart form for one attempt.
    ///
    /// Each file is read into memory and its handle closed before the form
    /// is returned, whether or not a later read fails.
    async fn build_form(&self, files: &[UploadFile]) -> Result<Form, AttemptError> {
        let mut form = Form::new()
            .text("apikey", self.api_key.clone())
            .text("secretapikey", self.secret_key.clone())
            .text("domain", self.domain.clone());

        for file in files {
            let bytes = tokio::fs::read(&file.local_path)
                .await
                .map_err(|source| AttemptError::Read {
                    path: file.local_path.clone(),
                    source,
                })?;
            let mime = mime_guess::from_path(&file.local_path).first_or_octet_stream();
            let part = Part::bytes(bytes)
                .file_name(file.remote_path.clone())
                .mime_str(mime.as_ref())?;
            form = form.part("files", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl UploadTransport for PorkbunClient {
    async fn send(
        &self,
        endpoint: &str,
        files: &[UploadFile],
        timeout: Duration,
    ) -> Result<(), AttemptError> {
        let form = self.build_form(files).await?;

        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: response_text,
            });
        }

        // A 200 can still carry {"status": "ERROR"}
        if let Ok(parsed) = serde_json::from_str::<PorkbunResponse>(&response_text)
            && parsed.status.eq_ignore_ascii_case("error")
        {
            return Err(AttemptError::Rejected(
                parsed
                    .message
                    .unwrap_or_else(|| "unknown Porkbun API error".to_string()),
            ));
        }

        debug!(endpoint = %endpoint, files = files.len(), "Porkbun accepted upload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{spawn_server, write_tree};
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn batch(root: &std::path::Path) -> Vec<UploadFile> {
        write_tree(root, &[("index.html", "<h1>hello porkbun</h1>")]);
        vec![UploadFile {
            local_path: root.join("index.html"),
            remote_path: "/index.html".to_string(),
        }]
    }

    #[tokio::test]
    async fn sends_credentials_and_files_as_multipart() {
        let seen: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let router = Router::new().route(
            "/hosting/upload",
            post(move |headers: HeaderMap, body: Bytes| {
                let captured = captured.clone();
                async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let body = String::from_utf8_lossy(&body).into_owned();
                    *captured.lock().unwrap() = Some((content_type, body));
                    axum::Json(serde_json::json!({ "status": "SUCCESS" }))
                }
            }),
        );
        let base = spawn_server(router).await;
        let dir = tempdir().unwrap();
        let client = PorkbunClient::new("pk1_key", "sk1_secret", "example.com").unwrap();

        client
            .send(
                &format!("{}/hosting/upload", base),
                &batch(dir.path()),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let (content_type, body) = seen.lock().unwrap().clone().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        assert!(body.contains("name=\"apikey\""));
        assert!(body.contains("pk1_key"));
        assert!(body.contains("sk1_secret"));
        assert!(body.contains("example.com"));
        assert!(body.contains("filename=\"/index.html\""));
        assert!(body.contains("<h1>hello porkbun</h1>"));
    }

    #[tokio::test]
    async fn error_status_fails_attempt() {
        let router = Router::new().route(
            "/hosting/upload",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn_server(router).await;
        let dir = tempdir().unwrap();
        let client = PorkbunClient::new("k", "s", "example.com").unwrap();

        let err = client
            .send(
                &format!("{}/hosting/upload", base),
                &batch(dir.path()),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AttemptError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn error_envelope_fails_attempt() {
        let router = Router::new().route(
            "/hosting/upload",
            post(|| async {
                axum::Json(serde_json::json!({ "status": "ERROR", "message": "Invalid API key." }))
            }),
        );
        let base = spawn_server(router).await;
        let dir = tempdir().unwrap();
        let client = PorkbunClient::new("k", "s", "example.com").unwrap();

        let err = client
            .send(
                &format!("{}/hosting/upload", base),
                &batch(dir.path()),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "upload rejected: Invalid API key.");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let router = Router::new().route(
            "/hosting/upload",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = spawn_server(router).await;
        let dir = tempdir().unwrap();
        let client = PorkbunClient::new("k", "s", "example.com").unwrap();

        let err = client
            .send(
                &format!("{}/hosting/upload", base),
                &batch(dir.path()),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AttemptError::Timeout));
    }

    #[tokio::test]
    async fn missing_local_file_fails_before_sending() {
        let client = PorkbunClient::new("k", "s", "example.com").unwrap();
        let files = vec![UploadFile {
            local_path: "/definitely/not/here.html".into(),
            remote_path: "/here.html".to_string(),
        }];

        let err = client
            .send("http://127.0.0.1:9/upload", &files, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AttemptError::Read { .. }));
    }
}
