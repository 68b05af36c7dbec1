use anyhow::{Context, Result};
use indicatif::{HumanBytes, MultiProgress};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::client::{build_http_client, ApiClient};
use crate::config::Settings;
use crate::crawler::Crawler;
use crate::downloader::{local_status, Downloader, LocalStatus};
use crate::export::ExportPaths;
use crate::scheduler::{DownloadTask, Scheduler, TaskHandler};
use crate::store::ProgressStore;

/// Mirror the share: re-queue unfinished recorded files, walk the tree, then
/// wait for every download to finish.
pub async fn run_mirror(settings: Settings, multi_progress: MultiProgress) -> Result<()> {
    fs::create_dir_all(&settings.download_root)
        .await
        .with_context(|| format!("Failed to create download directory {:?}", settings.download_root))?;
    fs::create_dir_all(&settings.state_dir)
        .await
        .with_context(|| format!("Failed to create state directory {:?}", settings.state_dir))?;

    let store = ProgressStore::load(ExportPaths::in_dir(&settings.state_dir))
        .await
        .context("Failed to load saved progress")?;

    let client = build_http_client(settings.proxy.as_deref(), settings.timeout)
        .context("Failed to build HTTP client")?;
    let api = ApiClient::new(&settings.base_url, client.clone(), settings.timeout)
        .context("Failed to derive API endpoints from the share URL")?;
    let downloader = Arc::new(Downloader::new(
        client,
        settings.download_root.clone(),
        settings.staging_dir.clone(),
        settings.rate_limit,
        multi_progress,
    ));
    let mut scheduler = Scheduler::new(downloader.clone(), settings.concurrency);

    info!(
        url = %settings.base_url,
        root = %settings.root,
        recorded = store.len().await,
        workers = scheduler.capacity(),
        "Starting mirror"
    );

    if settings.recover {
        let requeued = recover_unfinished(
            &store,
            &settings.download_root,
            &settings.staging_dir,
            &mut scheduler,
        )
        .await;
        if requeued > 0 {
            info!(count = requeued, "Re-queued recorded files that are not on disk");
        }
    }

    let stats = Crawler::new(&api, &store).crawl(&settings.root, &mut scheduler).await;
    scheduler.shutdown().await;

    let summary = downloader.summary();
    println!(
        "Traversal: {} directories | {} new files | {} already recorded | {} without URL | {} failures",
        stats.directories, stats.recorded, stats.already_recorded, stats.unresolved, stats.failed
    );
    println!(
        "Downloads: {} completed | {} skipped | {} failed | {} transferred",
        summary.completed,
        summary.skipped,
        summary.failed,
        HumanBytes(summary.bytes)
    );
    Ok(())
}

/// Submit every recorded file whose destination is missing or partial,
/// using the stored URL. Returns how many were submitted.
pub async fn recover_unfinished<H: TaskHandler>(
    store: &ProgressStore,
    download_root: &Path,
    staging_dir: &Path,
    scheduler: &mut Scheduler<H>,
) -> usize {
    let mut requeued = 0;
    for (relative_path, url) in store.snapshot().await {
        match local_status(download_root, staging_dir, &relative_path).await {
            Ok(LocalStatus::Completed { .. }) => {}
            Ok(LocalStatus::Partial { .. } | LocalStatus::Missing) => {
                scheduler.submit(DownloadTask::new(url, relative_path)).await;
                requeued += 1;
            }
            Err(e) => warn!(path = %relative_path, error = %e, "Cannot check recorded file"),
        }
    }
    requeued
}

/// Print every recorded file with its local status.
pub async fn list_recorded(settings: &Settings) -> Result<()> {
    let store = ProgressStore::load(ExportPaths::in_dir(&settings.state_dir))
        .await
        .context("Failed to load saved progress")?;
    let entries = store.snapshot().await;

    let mut rows = Vec::with_capacity(entries.len());
    let (mut completed, mut partial, mut missing) = (0usize, 0usize, 0usize);
    let mut bytes_on_disk: u64 = 0;

    for relative_path in entries.keys() {
        let status = local_status(&settings.download_root, &settings.staging_dir, relative_path).await;
        let (status, size) = match status {
            Ok(LocalStatus::Completed { size }) => {
                completed += 1;
                bytes_on_disk += size;
                ("Completed", format!("{}", HumanBytes(size)))
            }
            Ok(LocalStatus::Partial { size }) => {
                partial += 1;
                bytes_on_disk += size;
                ("Partial", format!("{}", HumanBytes(size)))
            }
            Ok(LocalStatus::Missing) => {
                missing += 1;
                ("Missing", String::from("-"))
            }
            Err(_) => ("Invalid", String::from("-")),
        };
        rows.push((relative_path.as_str(), status, size));
    }

    println!(
        "Summary: Recorded: {} | Completed: {} | Partial: {} | Missing: {} | On disk: {}",
        entries.len(),
        completed,
        partial,
        missing,
        HumanBytes(bytes_on_disk)
    );
    println!();

    if rows.is_empty() {
        println!("No recorded files in {:?}.", store.paths().json);
        return Ok(());
    }

    println!("{:<60} {:<12} {:<12}", "Path", "Status", "Size");
    println!("{:-<60} {:-<12} {:-<12}", "", "", "");
    for (path, status, size) in rows {
        println!("{:<60} {:<12} {:<12}", path, status, size);
    }
    Ok(())
}
