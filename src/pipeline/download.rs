//! Sequential page download with consecutive-failure end detection.
//!
//! Pages are requested one at a time at increasing indices. A failed fetch
//! is never fatal: it is counted and the next index is tried, so isolated
//! gaps in a chapter are crossed. In auto-detect mode a run of
//! `max_consecutive_failures` failures is read as the end of the chapter.

use crate::config::{ChapterConfig, PAGE_PLACEHOLDER};
use crate::error::{FetchError, PipelineError};
use crate::output::{DownloadReport, DownloadTermination};
use crate::pipeline::assemble::remove_stale_images;
use crate::progress::PipelineProgress;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches the raw bytes behind one page URL.
///
/// The default implementation is [`HttpFetcher`]; tests and embedders can
/// supply their own through [`crate::config::ChapterConfigBuilder::fetcher`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP GET via `reqwest`. Any non-2xx status is a [`FetchError`].
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: Option<u64>,
}

impl HttpFetcher {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, PipelineError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("webtoon2pdf/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let network = |e: reqwest::Error| match self.timeout_secs {
            Some(secs) if e.is_timeout() => FetchError::Timeout {
                url: url.to_string(),
                secs,
            },
            _ => FetchError::Network {
                url: url.to_string(),
                detail: e.to_string(),
            },
        };

        let response = self.client.get(url).send().await.map_err(network)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(network)?;
        Ok(bytes.to_vec())
    }
}

/// Parameters of one download run.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub base_url: String,
    pub start: u32,
    /// Inclusive end for bounded mode; `None` auto-detects.
    pub end: Option<u32>,
    pub max_consecutive_failures: u32,
    pub output_dir: PathBuf,
}

impl DownloadRequest {
    pub fn from_config(config: &ChapterConfig, output_dir: PathBuf) -> Result<Self, PipelineError> {
        Ok(Self {
            base_url: config.base_url.clone(),
            start: config.start_index()?,
            end: config.end_index()?,
            max_consecutive_failures: config.max_consecutive_failures,
            output_dir,
        })
    }
}

/// Substitute the page index, zero-padded to three digits, into `template`.
pub fn page_url(template: &str, index: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &format!("{index:03}"))
}

/// Last path segment of `url`, used as the file name on disk.
pub fn file_name_from_url(url: &str, index: u32) -> String {
    match url.rsplit('/').next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => format!("{index:03}.png"),
    }
}

/// Download pages into `request.output_dir`, creating it if needed.
///
/// Images left in the folder by an earlier run are deleted first, so the
/// merge only ever sees pages fetched by this run.
///
/// Only filesystem errors are returned as `Err`; fetch failures are
/// reported to `progress` and recorded in the report.
pub async fn download_pages(
    fetcher: &dyn PageFetcher,
    request: &DownloadRequest,
    progress: &dyn PipelineProgress,
) -> Result<DownloadReport, PipelineError> {
    tokio::fs::create_dir_all(&request.output_dir)
        .await
        .map_err(|e| PipelineError::io(&request.output_dir, e))?;
    remove_stale_images(&request.output_dir)?;

    match request.end {
        Some(end) => info!("Downloading pages {:03}..={:03}", request.start, end),
        None => info!(
            "Downloading from page {:03}, stopping after {} consecutive failures",
            request.start, request.max_consecutive_failures
        ),
    }

    let mut index = request.start;
    let mut consecutive: u32 = 0;
    let mut files = Vec::new();
    let mut failed_indices = Vec::new();

    loop {
        match request.end {
            Some(end) if index > end => break,
            None if consecutive >= request.max_consecutive_failures => break,
            _ => {}
        }

        let url = page_url(&request.base_url, index);
        match fetcher.fetch(&url).await {
            Ok(bytes) => {
                let name = file_name_from_url(&url, index);
                let path = request.output_dir.join(&name);
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| PipelineError::io(&path, e))?;
                debug!("Downloaded {} ({} bytes)", name, bytes.len());
                progress.on_page_downloaded(index, &name);
                files.push(name);
                consecutive = 0;
            }
            Err(e) => {
                consecutive += 1;
                warn!("Page {:03}: {}", index, e);
                progress.on_fetch_failed(index, &e, consecutive);
                failed_indices.push(index);
            }
        }

        index = match index.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    let termination = match request.end {
        Some(end) => DownloadTermination::RangeCompleted { end_index: end },
        None => DownloadTermination::SequenceExhausted {
            // `index` is one past the last attempt; step back over the
            // trailing failures and the increment.
            last_successful_index: (!files.is_empty())
                .then(|| index - consecutive - 1),
            consecutive_failures: consecutive,
        },
    };

    let report = DownloadReport {
        output_dir: request.output_dir.clone(),
        start_index: request.start,
        files,
        failed_indices,
        termination,
    };
    info!(
        "Download finished: {} pages, last successful index {:?}",
        report.downloaded(),
        report.last_successful_index()
    );
    progress.on_download_finished(&report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Serves `<n>` for every index in `available`, 404 otherwise.
    struct Scripted {
        available: HashSet<u32>,
        requested: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(available: impl IntoIterator<Item = u32>) -> Self {
            Self {
                available: available.into_iter().collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for Scripted {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            let digits: String = url
                .rsplit('-')
                .next()
                .unwrap()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let index: u32 = digits.parse().unwrap();
            if self.available.contains(&index) {
                Ok(vec![index as u8])
            } else {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            }
        }
    }

    fn request(dir: &std::path::Path, start: u32, end: Option<u32>) -> DownloadRequest {
        DownloadRequest {
            base_url: "https://cdn.example.com/series/0000-XXX.png".into(),
            start,
            end,
            max_consecutive_failures: 5,
            output_dir: dir.join("Chapter1"),
        }
    }

    #[test]
    fn page_url_pads_to_three_digits() {
        assert_eq!(page_url("https://x/0000-XXX.png", 7), "https://x/0000-007.png");
        assert_eq!(page_url("https://x/0000-XXX.png", 123), "https://x/0000-123.png");
        assert_eq!(page_url("https://x/0000-XXX.png", 1234), "https://x/0000-1234.png");
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name_from_url("https://x/a/b/0000-001.png", 1), "0000-001.png");
        assert_eq!(file_name_from_url("https://x/a/", 4), "004.png");
    }

    #[tokio::test]
    async fn auto_detect_stops_after_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Scripted::new(1..=10);
        let report = download_pages(&fetcher, &request(tmp.path(), 1, None), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.downloaded(), 10);
        assert_eq!(report.last_successful_index(), Some(10));
        assert_eq!(report.failed_indices, vec![11, 12, 13, 14, 15]);
        assert_eq!(
            report.termination,
            DownloadTermination::SequenceExhausted {
                last_successful_index: Some(10),
                consecutive_failures: 5
            }
        );
        assert_eq!(fetcher.requested.lock().unwrap().len(), 15);
        assert_eq!(std::fs::read_dir(&report.output_dir).unwrap().count(), 10);
    }

    #[tokio::test]
    async fn short_gap_is_crossed() {
        let tmp = tempfile::tempdir().unwrap();
        // 4..=7 missing (four failures), 8 present again.
        let fetcher = Scripted::new([1, 2, 3, 8, 9]);
        let report = download_pages(&fetcher, &request(tmp.path(), 1, None), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.files.len(), 5);
        assert_eq!(report.last_successful_index(), Some(9));
        assert!(report.output_dir.join("0000-008.png").exists());
    }

    #[tokio::test]
    async fn nothing_available_reports_no_last_index() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Scripted::new(Vec::<u32>::new());
        let report = download_pages(&fetcher, &request(tmp.path(), 1, None), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.downloaded(), 0);
        assert_eq!(report.last_successful_index(), None);
        assert!(report.output_dir.is_dir());
    }

    #[tokio::test]
    async fn bounded_mode_never_stops_early() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Scripted::new([1, 9]);
        let report = download_pages(&fetcher, &request(tmp.path(), 1, Some(10)), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(fetcher.requested.lock().unwrap().len(), 10);
        assert_eq!(report.files, vec!["0000-001.png", "0000-009.png"]);
        assert_eq!(report.termination, DownloadTermination::RangeCompleted { end_index: 10 });
        assert_eq!(report.last_successful_index(), Some(9));
    }

    #[tokio::test]
    async fn start_index_is_respected() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Scripted::new(1..=20);
        let report = download_pages(&fetcher, &request(tmp.path(), 18, None), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.files, vec!["0000-018.png", "0000-019.png", "0000-020.png"]);
        assert_eq!(
            fetcher.requested.lock().unwrap().first().map(String::as_str),
            Some("https://cdn.example.com/series/0000-018.png")
        );
    }

    #[tokio::test]
    async fn pages_from_an_earlier_run_are_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let req = request(tmp.path(), 1, Some(2));
        std::fs::create_dir_all(&req.output_dir).unwrap();
        std::fs::write(req.output_dir.join("0000-007.png"), b"old").unwrap();

        let fetcher = Scripted::new([1, 2]);
        download_pages(&fetcher, &req, &NoopProgress).await.unwrap();

        assert!(!req.output_dir.join("0000-007.png").exists());
        assert_eq!(std::fs::read_dir(&req.output_dir).unwrap().count(), 2);
    }

    // ── HttpFetcher against a local socket ───────────────────────────────

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 server: `/0000-001.png` answers 200 with `PAGE`,
    /// `/slow.png` never answers, anything else is a 404.
    async fn serve_pages() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let response = match path.as_str() {
                        "/0000-001.png" => "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nPAGE",
                        "/slow.png" => {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            return;
                        }
                        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn http_fetcher_maps_status_and_body() {
        let addr = serve_pages().await;
        let fetcher = HttpFetcher::new(Some(5)).unwrap();

        let body = fetcher
            .fetch(&format!("http://{addr}/0000-001.png"))
            .await
            .unwrap();
        assert_eq!(body, b"PAGE");

        let url = format!("http://{addr}/0000-002.png");
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(
            matches!(err, FetchError::Status { url: ref u, status: 404 } if *u == url),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn http_fetcher_maps_timeout_and_refused_connection() {
        let addr = serve_pages().await;
        let fetcher = HttpFetcher::new(Some(1)).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/slow.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { secs: 1, .. }), "unexpected error: {err:?}");

        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = fetcher
            .fetch(&format!("http://{closed}/0000-001.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "unexpected error: {err:?}");
    }
}
