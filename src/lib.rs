//! Mirror an Alist share onto local disk.
//!
//! The [`crawler`] walks the share through the [`client`], records each
//! resolved file in the [`store`], and hands the transfer to a bounded
//! [`scheduler`] of [`downloader`] workers. Progress survives restarts, so a
//! rerun picks up where the last one stopped.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod export;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod utils;

pub use client::{ApiClient, ItemKind, RemoteItem, RemoteTree};
pub use config::Settings;
pub use crawler::{CrawlStats, Crawler};
pub use downloader::{DownloadOutcome, DownloadSummary, Downloader};
pub use error::{ClientError, DownloadError, StoreError};
pub use scheduler::{DownloadTask, Scheduler, TaskHandler};
pub use store::ProgressStore;
