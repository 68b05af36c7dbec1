//! Renderers for the three progress artifacts.
//!
//! All three are pure functions of the progress map, so they can be
//! regenerated wholesale after every mutation.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

/// Relative path → resolved download URL, in traversal order.
pub type ProgressMap = IndexMap<String, String>;

/// Locations of the persisted artifacts.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
    pub csv: PathBuf,
}

impl ExportPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            json: dir.join("results.json"),
            text: dir.join("results.txt"),
            csv: dir.join("results.csv"),
        }
    }
}

/// Pretty JSON object, two-space indent, non-ASCII kept as-is.
pub fn render_json(map: &ProgressMap) -> serde_json::Result<String> {
    serde_json::to_string_pretty(map)
}

/// One `<path> -> <url>` line per entry.
pub fn render_text(map: &ProgressMap) -> String {
    let mut out = String::new();
    for (path, url) in map {
        out.push_str(path);
        out.push_str(" -> ");
        out.push_str(url);
        out.push('\n');
    }
    out
}

/// `path,url` header followed by one row per entry.
pub fn render_csv(map: &ProgressMap) -> String {
    let mut out = String::from("path,url\r\n");
    for (path, url) in map {
        out.push_str(&csv_field(path));
        out.push(',');
        out.push_str(&csv_field(url));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
