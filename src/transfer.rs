//! HTTP transfers: document fetches, resumable downloads and mirror fallback.

use crate::error::ModError;
use crate::paths::{pjoin, url_join};
use crate::progress::Progress;
use crate::types::ClientConfig;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, LOCATION, RANGE};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, error, info, warn};

/// Size assumed when a response carries no usable `Content-Length` (1 TiB).
pub const UNKNOWN_SIZE: u64 = 1024 * 1024 * 1024 * 1024;

/// Minimum number of bytes between two progress updates of one transfer.
const PROGRESS_STEP: u64 = 50 * 1024;

/// Outcome of a successful exchange: either content or "304 Not Modified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Ok(T),
    NotModified,
}

impl<T> Fetched<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Fetched::Ok(value) => Some(value),
            Fetched::NotModified => None,
        }
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, Fetched::NotModified)
    }
}

/// One file to fetch from an ordered list of mirrors.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Name of the file, appended to each mirror URL.
    pub filename: String,
    /// Candidate base URLs, tried in order.
    pub mirrors: Vec<String>,
    /// Where the finished file is placed.
    pub target: PathBuf,
    /// Bytes downloaded so far; the next attempt resumes from here.
    pub offset: u64,
}

impl DownloadTask {
    pub fn new(filename: impl Into<String>, mirrors: Vec<String>, target: PathBuf) -> Self {
        Self {
            filename: filename.into(),
            mirrors,
            target,
            offset: 0,
        }
    }
}

/// HTTP client with manual redirect handling and per-mirror retries.
#[derive(Debug, Clone)]
pub struct Transfer {
    client: reqwest::Client,
    retries: usize,
    retry_interval: Duration,
    max_redirects: usize,
}

impl Transfer {
    pub fn new(config: &ClientConfig) -> Result<Self, ModError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            retries: config.download_retries,
            retry_interval: config.retry_interval(),
            max_redirects: config.max_redirects,
        })
    }

    /// Issues a GET, following 301/302 by re-requesting the `Location`.
    ///
    /// With a non-zero `offset` a `Range` request is sent and `206` is
    /// accepted alongside `200`.
    async fn send(&self, url: &str, offset: u64) -> Result<Fetched<reqwest::Response>, ModError> {
        let mut link = url.to_string();

        for _ in 0..=self.max_redirects {
            info!("Retrieving \"{}\"...", link);

            let mut request = self.client.get(&link);
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", offset));
            }
            let response = request.send().await?;

            match response.status() {
                StatusCode::OK => return Ok(Fetched::Ok(response)),
                StatusCode::PARTIAL_CONTENT if offset > 0 => return Ok(Fetched::Ok(response)),
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or_else(|| ModError::HttpStatus {
                            url: link.clone(),
                            status: response.status().as_u16(),
                        })?;
                    let next = url_join(&link, location);
                    debug!("Following redirect from {} to {}", link, next);
                    link = next;
                }
                StatusCode::NOT_MODIFIED => return Ok(Fetched::NotModified),
                StatusCode::NOT_FOUND => return Err(ModError::NotFound(link)),
                status => {
                    return Err(ModError::HttpStatus {
                        url: link,
                        status: status.as_u16(),
                    })
                }
            }
        }

        Err(ModError::TooManyRedirects(url.to_string()))
    }

    /// Fetches a text document.
    pub async fn get(&self, url: &str) -> Result<Fetched<String>, ModError> {
        match self.send(url, 0).await? {
            Fetched::Ok(response) => Ok(Fetched::Ok(response.text().await?)),
            Fetched::NotModified => Ok(Fetched::NotModified),
        }
    }

    /// Like [`Transfer::get`], but logs failures and collapses them to `None`.
    pub async fn get_optional(&self, url: &str) -> Option<String> {
        match self.get(url).await {
            Ok(fetched) => fetched.ok(),
            Err(e) => {
                error!("Failed to load \"{}\": {}", url, e);
                None
            }
        }
    }

    /// Streams `url` into `target`, resuming after whatever `target` already holds.
    ///
    /// Returns the final length of `target`. If the server ignores the range
    /// request and sends the whole body, the file is rewritten from zero.
    pub async fn download(
        &self,
        url: &str,
        target: &Path,
        progress: &dyn Progress,
    ) -> Result<Fetched<u64>, ModError> {
        info!("Downloading \"{}\"...", url);

        let offset = match tokio::fs::metadata(target).await {
            Ok(m) => m.len(),
            Err(_) => 0,
        };

        let response = match self.send(url, offset).await? {
            Fetched::Ok(response) => response,
            Fetched::NotModified => return Ok(Fetched::NotModified),
        };

        let resumed = offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        if offset > 0 && !resumed {
            debug!("Server ignored range request for {}, restarting", url);
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if resumed {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = BufWriter::new(options.open(target).await?);

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let size = match content_length {
            Some(len) if len > 0 => len,
            Some(_) => 1,
            None => {
                warn!(
                    "Content-Length header was not present for {}. Progress will be meaningless.",
                    url
                );
                UNKNOWN_SIZE
            }
        };

        let name = url.rsplit('/').next().unwrap_or(url).to_string();
        let mut written = 0u64;
        let mut reported = 0u64;
        let mut byte_stream = response.bytes_stream();

        while let Some(piece) = byte_stream.next().await {
            let chunk = piece?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if written - reported >= PROGRESS_STEP {
                reported = written;
                let fraction = written as f64 / size as f64;
                progress.update(fraction, &format!("{}: {}%", name, (fraction * 100.0) as u64));
            }
        }
        file.flush().await?;
        progress.update(1.0, &format!("{}: 100%", name));

        if let Some(expected) = content_length {
            if written != expected {
                return Err(ModError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "Size mismatch for {}: expected {} bytes, got {} bytes",
                        url, expected, written
                    ),
                )));
            }
        }

        let start = if resumed { offset } else { 0 };
        Ok(Fetched::Ok(start + written))
    }

    /// Fetches `task.filename` from the first mirror that delivers it completely.
    ///
    /// Bytes land in a `.part` file next to the target; retries and later
    /// mirrors resume from what it already holds. The target is only replaced
    /// once a mirror delivers the whole file, so a failed or not-modified
    /// download leaves it untouched and the partial file is removed.
    pub async fn try_download(
        &self,
        task: &mut DownloadTask,
        progress: &dyn Progress,
    ) -> Result<Fetched<u64>, ModError> {
        let parent = match task.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", task.filename.replace('/', "_")))
            .suffix(".part")
            .tempfile_in(&parent)?;
        let part_path = partial.path().to_path_buf();
        task.offset = 0;

        for mirror in &task.mirrors {
            let url = pjoin([mirror.as_str(), task.filename.as_str()]);
            let retry_strategy =
                tokio_retry2::strategy::FixedInterval::new(self.retry_interval).take(self.retries);

            let result = Retry::spawn(retry_strategy, || {
                let url = url.clone();
                let part_path = &part_path;
                async move {
                    match self.download(&url, part_path, progress).await {
                        Ok(fetched) => Ok(fetched),
                        Err(e) if e.is_transient() => {
                            warn!("Failed to download {} due to error: {}", url, e);
                            RetryError::to_transient(e)
                        }
                        Err(e) => RetryError::to_permanent(e),
                    }
                }
            })
            .await;

            match result {
                Ok(Fetched::Ok(len)) => {
                    partial
                        .persist(&task.target)
                        .map_err(|e| ModError::IoError(e.error))?;
                    task.offset = len;
                    return Ok(Fetched::Ok(len));
                }
                Ok(Fetched::NotModified) => return Ok(Fetched::NotModified),
                Err(e) => {
                    warn!("Mirror {} failed for \"{}\": {}", mirror, task.filename, e);
                    task.offset = tokio::fs::metadata(&part_path)
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0);
                }
            }
        }

        Err(ModError::AllMirrorsFailed(task.filename.clone()))
    }
}
