//! Run settings: an optional TOML file with command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::cli::Args;
use crate::utils::{host_dir, proxy_url};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Contents of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub use_proxy: Option<bool>,
    pub proxy: Option<String>,
    pub threads: Option<usize>,
    pub root: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub rate_limit: Option<u32>,
}

impl FileConfig {
    /// Read `path`; a missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config file {:?}", path))
            }
        };
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(Some(config))
    }
}

/// Immutable inputs for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    pub proxy: Option<String>,
    pub concurrency: usize,
    pub root: String,
    /// `<download-dir>/<host>`: where the remote tree is mirrored.
    pub download_root: PathBuf,
    /// `<download-dir>/.partial/<host>`: in-progress downloads.
    pub staging_dir: PathBuf,
    pub state_dir: PathBuf,
    pub timeout: Duration,
    pub rate_limit: Option<u32>,
    pub recover: bool,
}

impl Settings {
    pub fn resolve(args: &Args) -> Result<Self> {
        let file = FileConfig::load(&args.config)?.unwrap_or_default();
        Self::merge(args, file)
    }

    fn merge(args: &Args, file: FileConfig) -> Result<Self> {
        let raw_url = args
            .url
            .clone()
            .or(file.url)
            .context("No share URL given; pass it as an argument or set `url` in the config file")?;
        let base_url = Url::parse(raw_url.trim()).with_context(|| format!("Invalid share URL: {}", raw_url))?;
        if base_url.host_str().is_none() {
            bail!("Share URL has no host: {}", raw_url);
        }

        let file_proxy = match file.use_proxy {
            Some(false) => None,
            _ => file.proxy.filter(|p| !p.trim().is_empty()),
        };
        let proxy = args.proxy.clone().or(file_proxy).map(|p| proxy_url(p.trim()));

        let concurrency = args
            .concurrency
            .or(file.threads)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        let root = args.root.clone().or(file.root).unwrap_or_else(|| "/".to_string());
        let root = if root.starts_with('/') { root } else { format!("/{}", root) };

        let download_dir = args
            .download_dir
            .clone()
            .or(file.download_dir)
            .unwrap_or_else(|| PathBuf::from("downloads"));
        let download_root = download_dir.join(host_dir(&base_url));
        let staging_dir = download_dir.join(".partial").join(host_dir(&base_url));

        let state_dir = args
            .state_dir
            .clone()
            .or(file.state_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let timeout = Duration::from_secs(
            args.timeout
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .max(1),
        );

        Ok(Self {
            base_url,
            proxy,
            concurrency,
            root,
            download_root,
            staging_dir,
            state_dir,
            timeout,
            rate_limit: args.rate_limit.or(file.rate_limit),
            recover: !args.no_recover,
        })
    }
}
