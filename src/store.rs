//! Persistent record of resolved files.
//!
//! Every mutation rewrites `results.json` and its text and CSV exports while
//! the store lock is held, so the three files always describe the same map.

use std::path::Path;

use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::export::{self, ExportPaths, ProgressMap};

pub struct ProgressStore {
    entries: Mutex<ProgressMap>,
    paths: ExportPaths,
}

impl ProgressStore {
    /// Load prior progress from `paths.json`, or start empty if it does not
    /// exist yet.
    pub async fn load(paths: ExportPaths) -> Result<Self, StoreError> {
        let entries = match fs::read_to_string(&paths.json).await {
            Ok(content) if content.trim().is_empty() => ProgressMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: paths.json.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProgressMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path: paths.json.clone(),
                    source,
                })
            }
        };

        Ok(Self {
            entries: Mutex::new(entries),
            paths,
        })
    }

    pub fn paths(&self) -> &ExportPaths {
        &self.paths
    }

    pub async fn contains(&self, relative_path: &str) -> bool {
        self.entries.lock().await.contains_key(relative_path)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Insert an entry and rewrite every artifact.
    ///
    /// The entry stays in memory even when writing fails; the error tells
    /// the caller that the on-disk progress is now behind.
    pub async fn record_and_persist(&self, relative_path: &str, url: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(relative_path.to_string(), url.to_string());
        self.persist(&entries).await
    }

    pub async fn snapshot(&self) -> ProgressMap {
        self.entries.lock().await.clone()
    }

    async fn persist(&self, entries: &ProgressMap) -> Result<(), StoreError> {
        let json = export::render_json(entries)?;
        write_atomic(&self.paths.json, json.as_bytes()).await?;
        write_atomic(&self.paths.text, export::render_text(entries).as_bytes()).await?;
        write_atomic(&self.paths.csv, export::render_csv(entries).as_bytes()).await?;
        Ok(())
    }
}

/// Write to a sibling `.tmp` file, then rename over the target.
async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, content).await.map_err(|source| StoreError::Io {
        action: "write",
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).await.map_err(|source| StoreError::Io {
        action: "replace",
        path: path.to_path_buf(),
        source,
    })
}
