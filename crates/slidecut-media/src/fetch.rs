//! Concurrent, all-or-nothing asset downloads.
//!
//! Every URL is checked against the [`SourcePolicy`] before any request is
//! sent. Transfers then run concurrently into `file_<index>.<ext>` inside the
//! destination directory. If any transfer fails, the remaining ones stop at
//! their next chunk, all of them are allowed to settle, and every file
//! written by the call is removed before the error is returned.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{DownloadFailure, FetchError};
use crate::fs_utils::remove_file_if_exists;
use crate::source::{extension_for_content_type, guess_extension, resolve_download_url, SourcePolicy};

/// Default per-file size limit (500 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 500 * 1024 * 1024;

/// Limits and policy for one [`AssetFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Largest accepted file in bytes
    pub max_bytes: u64,
    /// Wall-clock bound for a single transfer
    pub timeout: Duration,
    /// Transfers in flight at once
    pub max_parallel: usize,
    /// Accepted hosting domains
    pub policy: SourcePolicy,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: Duration::from_secs(300),
            max_parallel: 4,
            policy: SourcePolicy::default(),
            user_agent: concat!("slidecut/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// One downloaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedAsset {
    /// Position in the input list
    pub index: usize,
    /// URL as supplied by the caller
    pub source_url: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    /// Content type reported by the server
    pub declared_type: Option<String>,
}

#[derive(Debug)]
struct PlannedDownload {
    index: usize,
    original: String,
    download_url: Url,
    extension: String,
}

/// Paths created by one fetch call, for rollback.
#[derive(Default)]
struct WrittenFiles(Mutex<Vec<PathBuf>>);

impl WrittenFiles {
    fn record(&self, path: PathBuf) {
        if let Ok(mut paths) = self.0.lock() {
            paths.push(path);
        }
    }

    fn take(&self) -> Vec<PathBuf> {
        self.0
            .lock()
            .map(|mut paths| std::mem::take(&mut *paths))
            .unwrap_or_default()
    }
}

/// Downloads a list of URLs into a directory as a single unit.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    client: Client,
    config: FetchConfig,
}

impl AssetFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `urls` into `dest_dir`, preserving input order in the result.
    pub async fn fetch(
        &self,
        urls: &[String],
        dest_dir: &Path,
    ) -> Result<Vec<FetchedAsset>, FetchError> {
        let planned = self.plan(urls)?;
        if planned.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| FetchError::Destination {
                path: dest_dir.to_path_buf(),
                message: e.to_string(),
            })?;

        let written = WrittenFiles::default();
        let abort = AtomicBool::new(false);

        let downloads: Vec<_> = planned
            .iter()
            .map(|p| self.download(p, dest_dir, &written, &abort))
            .collect();
        let results: Vec<Result<Option<FetchedAsset>, FetchError>> =
            stream::iter(downloads)
                .buffered(self.config.max_parallel.max(1))
                .collect()
                .await;

        let mut assets = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(Some(asset)) => assets.push(asset),
                Ok(None) => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(error) = first_error {
            let removed = self.rollback(&written).await;
            warn!(
                url = error.url().unwrap_or_default(),
                removed,
                "Asset download failed, removed files from this batch: {}",
                error
            );
            return Err(error);
        }

        let total_bytes: u64 = assets.iter().map(|a| a.size_bytes).sum();
        metrics::counter!("slidecut_download_bytes_total").increment(total_bytes);
        info!(
            count = assets.len(),
            total_bytes,
            dest = %dest_dir.display(),
            "Fetched assets"
        );

        Ok(assets)
    }

    /// Validate every URL before any network activity.
    fn plan(&self, urls: &[String]) -> Result<Vec<PlannedDownload>, FetchError> {
        urls.iter()
            .enumerate()
            .map(|(index, raw)| {
                let url = self.config.policy.check(raw)?;
                Ok(PlannedDownload {
                    index,
                    original: raw.clone(),
                    extension: guess_extension(&url),
                    download_url: resolve_download_url(&url),
                })
            })
            .collect()
    }

    /// Run one transfer. `Ok(None)` means it stopped because a sibling failed.
    async fn download(
        &self,
        planned: &PlannedDownload,
        dest_dir: &Path,
        written: &WrittenFiles,
        abort: &AtomicBool,
    ) -> Result<Option<FetchedAsset>, FetchError> {
        if abort.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let result = self.transfer(planned, dest_dir, written, abort).await;
        if result.is_err() {
            abort.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn transfer(
        &self,
        planned: &PlannedDownload,
        dest_dir: &Path,
        written: &WrittenFiles,
        abort: &AtomicBool,
    ) -> Result<Option<FetchedAsset>, FetchError> {
        let fail = |reason| FetchError::download_failed(&planned.original, reason);
        let timed_out = || {
            fail(DownloadFailure::TimedOut {
                after_secs: self.config.timeout.as_secs(),
            })
        };
        let too_large = || {
            fail(DownloadFailure::TooLarge {
                limit_bytes: self.config.max_bytes,
            })
        };
        let write_err = |e: std::io::Error| fail(DownloadFailure::Write(e.to_string()));

        // Only network waits sit under the deadline; local file operations
        // always run to completion so rollback sees every file created.
        let deadline = Instant::now() + self.config.timeout;

        debug!(index = planned.index, url = %planned.download_url, "Starting download");

        let response = timeout_at(deadline, self.client.get(planned.download_url.clone()).send())
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| fail(DownloadFailure::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(DownloadFailure::Status(status.as_u16())));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.config.max_bytes)
        {
            return Err(too_large());
        }

        let declared_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let path = dest_dir.join(format!("file_{}.{}", planned.index, planned.extension));
        written.record(path.clone());
        let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;

        let mut size_bytes: u64 = 0;
        let mut body = response.bytes_stream();
        loop {
            if abort.load(Ordering::SeqCst) {
                return Ok(None);
            }

            let chunk = match timeout_at(deadline, body.next()).await {
                Ok(Some(chunk)) => chunk.map_err(|e| fail(DownloadFailure::Transport(e.to_string())))?,
                Ok(None) => break,
                Err(_) => return Err(timed_out()),
            };

            size_bytes += chunk.len() as u64;
            if size_bytes > self.config.max_bytes {
                return Err(too_large());
            }
            file.write_all(&chunk).await.map_err(write_err)?;
        }
        file.flush().await.map_err(write_err)?;
        drop(file);

        let local_path = match declared_type.as_deref().and_then(extension_for_content_type) {
            Some(ext) if ext != planned.extension => {
                let renamed = dest_dir.join(format!("file_{}.{}", planned.index, ext));
                written.record(renamed.clone());
                tokio::fs::rename(&path, &renamed).await.map_err(write_err)?;
                debug!(from = %path.display(), to = %renamed.display(), "Corrected extension");
                renamed
            }
            _ => path,
        };

        Ok(Some(FetchedAsset {
            index: planned.index,
            source_url: planned.original.clone(),
            local_path,
            size_bytes,
            declared_type,
        }))
    }

    async fn rollback(&self, written: &WrittenFiles) -> usize {
        let mut removed = 0;
        for path in written.take() {
            match remove_file_if_exists(&path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), "Failed to remove partial download: {}", e),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_config() -> FetchConfig {
        FetchConfig {
            max_bytes: 1024,
            timeout: Duration::from_secs(5),
            max_parallel: 4,
            policy: SourcePolicy::new(["127.0.0.1"]),
            ..FetchConfig::default()
        }
    }

    async fn file_names(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
            while let Some(entry) = entries.next_entry().await.unwrap() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_fetch_preserves_order_and_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 10])
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 20]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(local_config()).unwrap();
        let urls = vec![
            format!("{}/a.jpg", server.uri()),
            format!("{}/b.png", server.uri()),
        ];

        let assets = fetcher.fetch(&urls, dir.path()).await.unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].index, 0);
        assert_eq!(assets[0].size_bytes, 10);
        assert_eq!(assets[0].local_path, dir.path().join("file_0.jpg"));
        assert_eq!(assets[1].size_bytes, 20);
        assert_eq!(assets[1].local_path, dir.path().join("file_1.png"));
    }

    #[tokio::test]
    async fn test_oversized_file_leaves_no_residue() {
        let server = MockServer::start().await;
        for name in ["/ok1.jpg", "/ok2.jpg"] {
            Mock::given(method("GET"))
                .and(path(name))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/huge.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(local_config()).unwrap();
        let urls = vec![
            format!("{}/ok1.jpg", server.uri()),
            format!("{}/ok2.jpg", server.uri()),
            format!("{}/huge.mp4", server.uri()),
        ];

        let err = fetcher.fetch(&urls, dir.path()).await.unwrap_err();

        match &err {
            FetchError::DownloadFailed { url, reason } => {
                assert_eq!(url, &urls[2]);
                assert_eq!(reason, &DownloadFailure::TooLarge { limit_bytes: 1024 });
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(file_names(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_source_sends_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(local_config()).unwrap();
        let urls = vec![
            format!("{}/ok.jpg", server.uri()),
            "https://example.com/elsewhere.jpg".to_string(),
        ];

        let err = fetcher.fetch(&urls, dir.path()).await.unwrap_err();

        assert!(err.is_source_rejected());
        assert_eq!(err.url(), Some("https://example.com/elsewhere.jpg"));
        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fast.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 10])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = FetchConfig {
            timeout: Duration::from_millis(300),
            ..local_config()
        };
        let fetcher = AssetFetcher::new(config).unwrap();
        let urls = vec![
            format!("{}/fast.jpg", server.uri()),
            format!("{}/slow.mp4", server.uri()),
        ];

        let err = fetcher.fetch(&urls, dir.path()).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::DownloadFailed {
                reason: DownloadFailure::TimedOut { .. },
                ..
            }
        ));
        assert!(file_names(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_declared_type_corrects_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![9u8; 8]),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(local_config()).unwrap();
        let urls = vec![format!("{}/download", server.uri())];

        let assets = fetcher.fetch(&urls, dir.path()).await.unwrap();

        assert_eq!(assets[0].local_path, dir.path().join("file_0.png"));
        assert_eq!(assets[0].declared_type.as_deref(), Some("image/png"));
        assert_eq!(file_names(dir.path()).await, vec!["file_0.png".to_string()]);
    }

    #[tokio::test]
    async fn test_http_error_status_fails_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = AssetFetcher::new(local_config()).unwrap();
        let urls = vec![format!("{}/gone.jpg", server.uri())];

        let err = fetcher.fetch(&urls, dir.path()).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::DownloadFailed {
                reason: DownloadFailure::Status(404),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_list_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("never-created");
        let fetcher = AssetFetcher::new(local_config()).unwrap();

        let assets = fetcher.fetch(&[], &dest).await.unwrap();
        assert!(assets.is_empty());
        assert!(!dest.exists());
    }
}
