//! Image fetching: normalise a task source to a local file.
//!
//! ## Why download to a temp file?
//!
//! Decoders want a path, and a uniquely named `tempfile` gives concurrent
//! downloads of the same URL separate files. The [`TempPath`] rides along in
//! [`FetchedImage::Downloaded`] so the file is removed as soon as decoding is
//! done, even when the task failed.
//!
//! Every failure is reported as a [`TaskError`]; a fetch never silently
//! stalls, so a dead link frees its concurrency slot.

use crate::config::{FetchBackend, RenderConfig};
use crate::error::{SliceError, TaskError};
use crate::task::ImageSource;
use futures::future::{self, BoxFuture, FutureExt};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, info};

/// A fetched image ready for decoding.
pub enum FetchedImage {
    /// Source was already a local file.
    Local(PathBuf),
    /// Source was a URL; the body lives in a temporary file removed on drop.
    Downloaded { path: PathBuf, _temp: TempPath },
}

impl FetchedImage {
    /// Path of the image file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            FetchedImage::Local(p) => p,
            FetchedImage::Downloaded { path, .. } => path,
        }
    }
}

/// Future returned by [`Fetcher::fetch`].
pub type FetchFuture = BoxFuture<'static, Result<FetchedImage, TaskError>>;

/// Turns an [`ImageSource`] into a local file.
///
/// Each call returns an independent future; many may be in flight at once.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, source: &ImageSource) -> FetchFuture;
}

/// The default fetcher: local pass-through, remote via HTTP or `curl`.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    backend: FetchBackend,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new(config: &RenderConfig) -> Result<Self, SliceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| SliceError::HttpClient(e.to_string()))?;
        Ok(Self {
            backend: config.fetch_backend,
            timeout_secs: config.download_timeout_secs,
            client,
        })
    }
}

impl Fetcher for ImageFetcher {
    fn fetch(&self, source: &ImageSource) -> FetchFuture {
        match source {
            ImageSource::Local(path) => future::ready(Ok(FetchedImage::Local(path.clone()))).boxed(),
            ImageSource::Remote(url) => match self.backend {
                FetchBackend::Http => {
                    download_http(self.client.clone(), url.clone(), self.timeout_secs).boxed()
                }
                FetchBackend::Curl => download_curl(url.clone(), self.timeout_secs).boxed(),
            },
        }
    }
}

/// Download `url` with the in-process HTTP client.
async fn download_http(
    client: reqwest::Client,
    url: Url,
    timeout_secs: u64,
) -> Result<FetchedImage, TaskError> {
    info!("Downloading image from: {}", url);
    let fetch_err = |reason: String| TaskError::Fetch {
        source_ref: url.to_string(),
        reason,
    };

    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            TaskError::FetchTimeout {
                source_ref: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            fetch_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            TaskError::FetchTimeout {
                source_ref: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            fetch_err(e.to_string())
        }
    })?;

    let temp = temp_target(&url)?;
    tokio::fs::write(&temp, &bytes)
        .await
        .map_err(|e| fetch_err(format!("failed to write temp file: {e}")))?;

    debug!("Downloaded {} bytes to {}", bytes.len(), temp.display());
    Ok(FetchedImage::Downloaded {
        path: temp.to_path_buf(),
        _temp: temp,
    })
}

/// Download `url` with an external `curl` process.
async fn download_curl(url: Url, timeout_secs: u64) -> Result<FetchedImage, TaskError> {
    info!("Downloading image with curl from: {}", url);
    let temp = temp_target(&url)?;

    let output = tokio::process::Command::new("curl")
        .args(["--silent", "--show-error", "--fail", "--location"])
        .arg("--max-time")
        .arg(timeout_secs.to_string())
        .arg("--output")
        .arg(temp.as_os_str())
        .arg(url.as_str())
        .output()
        .await
        .map_err(|e| TaskError::Fetch {
            source_ref: url.to_string(),
            reason: format!("failed to run curl: {e}"),
        })?;

    if !output.status.success() {
        // curl exit code 28: operation timed out
        if output.status.code() == Some(28) {
            return Err(TaskError::FetchTimeout {
                source_ref: url.to_string(),
                secs: timeout_secs,
            });
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "<signal>".to_string());
        return Err(TaskError::Fetch {
            source_ref: url.to_string(),
            reason: if stderr.trim().is_empty() {
                format!("curl failed (exit code {code})")
            } else {
                format!("curl failed (exit code {code}): {}", stderr.trim())
            },
        });
    }

    debug!("curl wrote {}", temp.display());
    Ok(FetchedImage::Downloaded {
        path: temp.to_path_buf(),
        _temp: temp,
    })
}

/// Allocate a fresh, uniquely named temp file keeping the URL's extension.
fn temp_target(url: &Url) -> Result<TempPath, TaskError> {
    let suffix = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| Path::new(last).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix("sliced-images-")
        .suffix(&suffix)
        .tempfile()
        .map(|f| f.into_temp_path())
        .map_err(|e| TaskError::Fetch {
            source_ref: url.to_string(),
            reason: format!("failed to create temp file: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response on an ephemeral port and return its base URL.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(&body).await.unwrap();
            sock.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[test]
    fn local_sources_pass_through() {
        let fetcher = ImageFetcher::new(&RenderConfig::default()).unwrap();
        let source = ImageSource::Local(PathBuf::from("/tmp/a.png"));
        let fetched = tokio_test::block_on(fetcher.fetch(&source)).unwrap();
        assert_eq!(fetched.path(), Path::new("/tmp/a.png"));
    }

    #[test]
    fn temp_targets_are_unique_and_keep_extension() {
        let url = Url::parse("https://x.invalid/dir/pic.jpeg").unwrap();
        let a = temp_target(&url).unwrap();
        let b = temp_target(&url).unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());
        assert!(a.to_string_lossy().ends_with(".jpeg"));
    }

    #[tokio::test]
    async fn http_download_writes_body_and_cleans_up() {
        let base = serve_once("200 OK", b"hello image".to_vec()).await;
        let fetcher = ImageFetcher::new(&RenderConfig::default()).unwrap();
        let url = Url::parse(&format!("{base}/a.png")).unwrap();

        let fetched = fetcher.fetch(&ImageSource::Remote(url)).await.unwrap();
        let path = fetched.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello image");

        drop(fetched);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let base = serve_once("404 Not Found", Vec::new()).await;
        let fetcher = ImageFetcher::new(&RenderConfig::default()).unwrap();
        let url = Url::parse(&format!("{base}/missing.png")).unwrap();

        match fetcher.fetch(&ImageSource::Remote(url)).await {
            Err(TaskError::Fetch { reason, .. }) => assert!(reason.contains("404"), "got: {reason}"),
            other => panic!("expected fetch error, got {:?}", other.map(|f| f.path().to_path_buf())),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_reported() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let fetcher = ImageFetcher::new(&RenderConfig::default()).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/a.png")).unwrap();
        assert!(fetcher.fetch(&ImageSource::Remote(url)).await.is_err());
    }

    fn curl_available() -> bool {
        std::process::Command::new("curl")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn curl_download_writes_body_and_cleans_up() {
        if !curl_available() {
            eprintln!("curl not found; skipping");
            return;
        }
        let base = serve_once("200 OK", b"curl body".to_vec()).await;
        let url = Url::parse(&format!("{base}/b.png")).unwrap();

        let fetched = download_curl(url, 10).await.unwrap();
        let path = fetched.path().to_path_buf();
        assert!(path.to_string_lossy().ends_with(".png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"curl body");

        drop(fetched);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn curl_error_status_reports_exit_code() {
        if !curl_available() {
            eprintln!("curl not found; skipping");
            return;
        }
        let base = serve_once("404 Not Found", Vec::new()).await;
        let url = Url::parse(&format!("{base}/missing.png")).unwrap();

        match download_curl(url, 10).await {
            Err(TaskError::Fetch { reason, .. }) => {
                assert!(reason.contains("exit code 22"), "got: {reason}")
            }
            other => panic!("expected fetch error, got {:?}", other.map(|f| f.path().to_path_buf())),
        }
    }

    #[tokio::test]
    async fn curl_connection_refused_is_reported() {
        if !curl_available() {
            eprintln!("curl not found; skipping");
            return;
        }
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let url = Url::parse(&format!("http://127.0.0.1:{port}/a.png")).unwrap();
        assert!(matches!(
            download_curl(url, 10).await,
            Err(TaskError::Fetch { .. })
        ));
    }

}
