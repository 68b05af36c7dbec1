use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the share (e.g. https://pan.example.com); overrides `url` in the config file
    #[arg(index = 1)]
    pub url: Option<String>,

    /// TOML file holding default settings
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// SOCKS5 proxy address (e.g. 127.0.0.1:1080)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Maximum number of concurrent downloads [default: 10]
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Remote directory to start from [default: /]
    #[arg(long)]
    pub root: Option<String>,

    /// Directory to save downloaded files; a per-host subdirectory is created inside [default: downloads]
    #[arg(short = 'd', long = "download-dir")]
    pub download_dir: Option<PathBuf>,

    /// Directory holding results.json, results.txt and results.csv [default: .]
    #[arg(long = "state-dir")]
    pub state_dir: Option<PathBuf>,

    /// Network timeout in seconds for connecting and for each read [default: 30]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    pub rate_limit: Option<u32>,

    /// List recorded files and their local status, then exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Do not re-queue recorded files that are missing locally
    #[arg(long)]
    pub no_recover: bool,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Log debug output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
