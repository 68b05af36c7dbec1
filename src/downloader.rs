use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use reqwest::{header, Client, Response, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::scheduler::{DownloadTask, TaskHandler};
use crate::utils::{local_path, staging_path};

/// What a finished download did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination already existed; nothing was fetched.
    Skipped { size: u64 },
    /// The file was fetched; `bytes` counts only this run's transfer.
    Completed { bytes: u64 },
}

/// State of a recorded file on local disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    Completed { size: u64 },
    Partial { size: u64 },
    Missing,
}

/// Look at the destination of `relative_path` and its staged partial
/// without touching the network.
pub async fn local_status(
    download_root: &Path,
    staging_dir: &Path,
    relative_path: &str,
) -> Result<LocalStatus, DownloadError> {
    let filepath = local_path(download_root, relative_path)?;
    if let Ok(metadata) = fs::metadata(&filepath).await {
        return Ok(LocalStatus::Completed {
            size: metadata.len(),
        });
    }
    if let Ok(metadata) = fs::metadata(staging_path(staging_dir, relative_path)).await {
        return Ok(LocalStatus::Partial {
            size: metadata.len(),
        });
    }
    Ok(LocalStatus::Missing)
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    active: AtomicUsize,
    bytes: AtomicU64,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

pub struct Downloader {
    client: Client,
    download_root: PathBuf,
    staging_dir: PathBuf,
    multi_progress: MultiProgress,
    header_pb: ProgressBar,
    rate_limiter: Option<(RateLimiter<NotKeyed, InMemoryState, DefaultClock>, NonZeroU32)>,
    counters: Counters,
}

impl Downloader {
    pub fn new(
        client: Client,
        download_root: PathBuf,
        staging_dir: PathBuf,
        rate_limit_bytes_per_sec: Option<u32>,
        multi_progress: MultiProgress,
    ) -> Self {
        let header_pb = multi_progress.add(ProgressBar::new(0));
        header_pb.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));

        let rate_limiter = rate_limit_bytes_per_sec
            .and_then(NonZeroU32::new)
            .map(|limit| (RateLimiter::direct(Quota::per_second(limit)), limit));

        let downloader = Self {
            client,
            download_root,
            staging_dir,
            multi_progress,
            header_pb,
            rate_limiter,
            counters: Counters::default(),
        };
        downloader.refresh_header();
        downloader
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    pub fn summary(&self) -> DownloadSummary {
        DownloadSummary {
            completed: self.counters.completed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
        }
    }

    /// Fetch one file into the download root.
    ///
    /// An existing destination is left alone. Bytes go to a file in the
    /// staging directory first, and the final name only appears once the
    /// body has been fully written.
    pub async fn download(&self, task: &DownloadTask) -> Result<DownloadOutcome, DownloadError> {
        let filepath = local_path(&self.download_root, &task.relative_path)?;
        if let Some(parent) = filepath.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::fs("create directory", parent, e))?;
        }

        if let Ok(metadata) = fs::metadata(&filepath).await {
            let size = metadata.len();
            let modified = metadata
                .modified()
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            info!(
                path = %task.relative_path,
                size = %HumanBytes(size),
                modified = %modified,
                "Skipped, already on disk"
            );
            return Ok(DownloadOutcome::Skipped { size });
        }

        info!(path = %task.relative_path, "Downloading");
        let pb = self.multi_progress.add(ProgressBar::new(0));
        pb.set_message(task.relative_path.clone());

        let staged = staging_path(&self.staging_dir, &task.relative_path);
        let result = self.transfer(&task.url, &staged, &filepath, &pb).await;
        pb.finish_and_clear();
        self.multi_progress.remove(&pb);
        result.map(|bytes| DownloadOutcome::Completed { bytes })
    }

    async fn transfer(
        &self,
        url: &str,
        part_filepath: &Path,
        filepath: &Path,
        pb: &ProgressBar,
    ) -> Result<u64, DownloadError> {
        fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| DownloadError::fs("create directory", &self.staging_dir, e))?;
        let mut requested = fs::metadata(part_filepath).await.map(|m| m.len()).unwrap_or(0);

        let mut response = self.send(url, requested).await?;
        if requested > 0 {
            let status = response.status();
            let misplaced = status == StatusCode::PARTIAL_CONTENT
                && content_range_start(&response) != Some(requested);
            if status == StatusCode::RANGE_NOT_SATISFIABLE || misplaced {
                debug!(url = %url, status = %status, "Resume refused, fetching from the start");
                requested = 0;
                response = self.send(url, 0).await?;
            }
        }
        let response = response
            .error_for_status()
            .map_err(|source| DownloadError::Transport {
                url: url.to_string(),
                source,
            })?;

        // Only a 206 continues the partial file; anything else starts over.
        let offset = if requested > 0 && response.status() == StatusCode::PARTIAL_CONTENT {
            requested
        } else {
            0
        };

        match response.content_length() {
            Some(len) => {
                pb.set_length(len + offset);
                pb.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
            }
            None => pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bytes:>12} {bytes_per_sec:>12} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            ),
        }
        pb.set_position(offset);

        let mut file = if offset > 0 {
            OpenOptions::new().append(true).open(part_filepath).await
        } else {
            fs::File::create(part_filepath).await
        }
        .map_err(|e| DownloadError::fs("open", part_filepath, e))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|source| DownloadError::Transport {
                url: url.to_string(),
                source,
            })?;
            if chunk.is_empty() {
                continue;
            }
            self.throttle(chunk.len()).await;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::fs("write", part_filepath, e))?;

            let len = chunk.len() as u64;
            written += len;
            pb.inc(len);
            self.counters.bytes.fetch_add(len, Ordering::Relaxed);
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::fs("flush", part_filepath, e))?;
        drop(file);

        fs::rename(part_filepath, filepath)
            .await
            .map_err(|e| DownloadError::fs("rename", part_filepath, e))?;
        Ok(written)
    }

    async fn send(&self, url: &str, resume_from: u64) -> Result<Response, DownloadError> {
        let mut request = self.client.get(url);
        if resume_from > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", resume_from));
        }
        request.send().await.map_err(|source| DownloadError::Transport {
            url: url.to_string(),
            source,
        })
    }

    async fn throttle(&self, len: usize) {
        let Some((limiter, burst)) = &self.rate_limiter else {
            return;
        };
        let mut remaining = u32::try_from(len).unwrap_or(u32::MAX);
        while remaining > 0 {
            let take = remaining.min(burst.get());
            if let Some(n) = NonZeroU32::new(take) {
                // `take` never exceeds the burst size, so this cannot fail.
                let _ = limiter.until_n_ready(n).await;
            }
            remaining -= take;
        }
    }

    fn refresh_header(&self) {
        let summary = self.summary();
        self.header_pb.set_message(format!(
            "Summary: Done: {} | Skipped: {} | Failed: {} | Active: {} | Downloaded: {}",
            summary.completed,
            summary.skipped,
            summary.failed,
            self.counters.active.load(Ordering::Relaxed),
            HumanBytes(summary.bytes)
        ));
        self.header_pb.tick();
    }
}

/// First byte position of a `Content-Range: bytes <start>-<end>/<len>` header.
fn content_range_start(response: &Response) -> Option<u64> {
    let value = response.headers().get(header::CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes ")?;
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

#[async_trait]
impl TaskHandler for Downloader {
    async fn handle(&self, task: DownloadTask) {
        self.counters.active.fetch_add(1, Ordering::Relaxed);
        self.refresh_header();

        match self.download(&task).await {
            Ok(DownloadOutcome::Skipped { .. }) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DownloadOutcome::Completed { bytes }) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(path = %task.relative_path, size = %HumanBytes(bytes), "Downloaded");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(path = %task.relative_path, error = %e, "Download failed");
            }
        }

        self.counters.active.fetch_sub(1, Ordering::Relaxed);
        self.refresh_header();
    }
}
