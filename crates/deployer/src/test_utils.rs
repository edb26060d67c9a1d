//! Fakes and fixtures shared by the unit tests.

use async_trait::async_trait;
use siteferry_core::SiteId;
use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::clock::Clock;
use crate::fetcher::{SiteMirror, SourceError, SourcePlatform};
use crate::upload::{AttemptError, UploadFile, UploadTransport};

/// Write `(relative path, contents)` pairs under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let target = root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(target, contents).unwrap();
    }
}

pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, contents) in files {
        zip.start_file(*path, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Source platform with scripted publish results. Publishing succeeds once
/// the script runs out; the export is missing unless set.
#[derive(Default)]
pub struct FakeSource {
    publish_results: Mutex<VecDeque<Result<(), SourceError>>>,
    publish_calls: Mutex<usize>,
    export: Mutex<Option<Vec<u8>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_publish(&self, result: Result<(), SourceError>) {
        self.publish_results.lock().unwrap().push_back(result);
    }

    pub fn set_export(&self, bytes: Vec<u8>) {
        *self.export.lock().unwrap() = Some(bytes);
    }

    pub fn publish_calls(&self) -> usize {
        *self.publish_calls.lock().unwrap()
    }
}

#[async_trait]
impl SourcePlatform for FakeSource {
    async fn publish(&self, _site_id: &SiteId) -> Result<(), SourceError> {
        *self.publish_calls.lock().unwrap() += 1;
        self.publish_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn download_export(&self, _site_id: &SiteId) -> Result<Vec<u8>, SourceError> {
        self.export
            .lock()
            .unwrap()
            .clone()
            .ok_or(SourceError::Status {
                status: 404,
                body: "export not found".to_string(),
            })
    }
}

/// Mirror that writes a fixed set of files.
pub struct FakeMirror {
    host: String,
    files: Vec<(String, String)>,
    calls: Mutex<usize>,
}

impl FakeMirror {
    pub fn new(host: &str, files: &[(&str, &str)]) -> Self {
        Self {
            host: host.to_string(),
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SiteMirror for FakeMirror {
    fn host(&self) -> &str {
        &self.host
    }

    async fn mirror(&self, dest: &Path) -> Result<usize, SourceError> {
        *self.calls.lock().unwrap() += 1;
        let host_dir = dest.join(&self.host);
        fs::create_dir_all(&host_dir)?;
        let files: Vec<(&str, &str)> = self
            .files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        write_tree(&host_dir, &files);
        Ok(files.len())
    }
}

/// Transport failing the first `failures` sends, then accepting.
///
/// Every send reads each file, so a batch pointing at a missing tree fails.
pub struct FakeTransport {
    failures: usize,
    endpoints: Mutex<Vec<String>>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl FakeTransport {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            endpoints: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }

    /// Remote paths of each successful batch
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTransport for FakeTransport {
    async fn send(
        &self,
        endpoint: &str,
        files: &[UploadFile],
        _timeout: Duration,
    ) -> Result<(), AttemptError> {
        let attempt = {
            let mut endpoints = self.endpoints.lock().unwrap();
            endpoints.push(endpoint.to_string());
            endpoints.len()
        };

        for file in files {
            fs::read(&file.local_path).map_err(|source| AttemptError::Read {
                path: file.local_path.clone(),
                source,
            })?;
        }

        if attempt <= self.failures {
            return Err(AttemptError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        self.batches
            .lock()
            .unwrap()
            .push(files.iter().map(|f| f.remote_path.clone()).collect());
        Ok(())
    }
}

/// Fake clock: `sleep` moves time forward immediately.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += duration;
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
        // Let other tasks observe the new time before we continue
        tokio::task::yield_now().await;
    }
}
