//! Depth-first walk of the remote tree.
//!
//! Listing and resolution happen one call at a time on the walking task;
//! only byte transfers are handed to the scheduler. A file's entry is always
//! recorded before its task is submitted.

use tracing::{debug, error, info, warn};

use crate::client::{ItemKind, RemoteItem, RemoteTree};
use crate::scheduler::{DownloadTask, Scheduler, TaskHandler};
use crate::store::ProgressStore;
use crate::utils::{join_relative, join_remote};

/// Per-run traversal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Directories listed successfully.
    pub directories: usize,
    /// Files newly resolved, recorded and submitted.
    pub recorded: usize,
    /// Files skipped because progress already had them.
    pub already_recorded: usize,
    /// Files the share had no URL for.
    pub unresolved: usize,
    /// Listing or resolution failures.
    pub failed: usize,
}

/// A listed directory whose items are still being visited.
struct Frame {
    remote_dir: String,
    prefix: String,
    items: std::vec::IntoIter<RemoteItem>,
}

pub struct Crawler<'a, R: ?Sized> {
    remote: &'a R,
    store: &'a ProgressStore,
    stats: CrawlStats,
}

impl<'a, R: RemoteTree + ?Sized> Crawler<'a, R> {
    pub fn new(remote: &'a R, store: &'a ProgressStore) -> Self {
        Self {
            remote,
            store,
            stats: CrawlStats::default(),
        }
    }

    /// Walk everything under `root`, submitting each newly resolved file.
    ///
    /// Visit order matches a recursive walk: a subdirectory is finished
    /// before the items that follow it in its parent's listing.
    pub async fn crawl<H: TaskHandler>(mut self, root: &str, scheduler: &mut Scheduler<H>) -> CrawlStats {
        let mut stack: Vec<Frame> = Vec::new();
        if let Some(frame) = self.open(root.to_string(), String::new()).await {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let Some(item) = frame.items.next() else {
                stack.pop();
                continue;
            };
            let remote_path = join_remote(&frame.remote_dir, &item.name);
            let relative_path = join_relative(&frame.prefix, &item.name);

            match item.kind {
                ItemKind::Directory => {
                    info!(path = %format!("{}/", relative_path), "Directory");
                    if let Some(child) = self.open(remote_path, relative_path).await {
                        stack.push(child);
                    }
                }
                ItemKind::File => self.visit_file(&remote_path, &relative_path, scheduler).await,
            }
        }

        self.stats
    }

    async fn open(&mut self, remote_dir: String, prefix: String) -> Option<Frame> {
        match self.remote.list_directory(&remote_dir).await {
            Ok(items) => {
                self.stats.directories += 1;
                if items.is_empty() {
                    debug!(path = %remote_dir, "Empty directory");
                    return None;
                }
                Some(Frame {
                    remote_dir,
                    prefix,
                    items: items.into_iter(),
                })
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(path = %remote_dir, error = %e, "Listing failed, skipping directory");
                None
            }
        }
    }

    async fn visit_file<H: TaskHandler>(
        &mut self,
        remote_path: &str,
        relative_path: &str,
        scheduler: &mut Scheduler<H>,
    ) {
        if self.store.contains(relative_path).await {
            self.stats.already_recorded += 1;
            info!(path = %relative_path, "Skipped, already recorded");
            return;
        }

        match self.remote.resolve_download_url(remote_path).await {
            Ok(Some(url)) => {
                if let Err(e) = self.store.record_and_persist(relative_path, &url).await {
                    error!(
                        path = %relative_path,
                        error = %e,
                        "Failed to persist progress; a restart may resolve this file again"
                    );
                }
                self.stats.recorded += 1;
                scheduler.submit(DownloadTask::new(url, relative_path)).await;
            }
            Ok(None) => {
                self.stats.unresolved += 1;
                warn!(path = %relative_path, "No download URL, will retry next run");
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(path = %relative_path, error = %e, "Resolving download URL failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::error::ClientError;
    use crate::export::ExportPaths;

    /// In-memory remote tree keyed by absolute remote path.
    #[derive(Default)]
    struct FakeTree {
        dirs: HashMap<String, Vec<RemoteItem>>,
        urls: HashMap<String, Option<String>>,
        broken: HashSet<String>,
        resolved: Mutex<Vec<String>>,
    }

    impl FakeTree {
        fn dir(mut self, path: &str, items: Vec<RemoteItem>) -> Self {
            self.dirs.insert(path.to_string(), items);
            self
        }

        fn url(mut self, path: &str, url: Option<&str>) -> Self {
            self.urls.insert(path.to_string(), url.map(str::to_string));
            self
        }

        fn broken(mut self, path: &str) -> Self {
            self.broken.insert(path.to_string());
            self
        }

        fn resolve_count(&self) -> usize {
            self.resolved.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteTree for FakeTree {
        async fn list_directory(&self, path: &str) -> Result<Vec<RemoteItem>, ClientError> {
            if self.broken.contains(path) {
                return Err(ClientError::protocol("list", path, "broken"));
            }
            Ok(self.dirs.get(path).cloned().unwrap_or_default())
        }

        async fn resolve_download_url(&self, path: &str) -> Result<Option<String>, ClientError> {
            self.resolved.lock().unwrap().push(path.to_string());
            if self.broken.contains(path) {
                return Err(ClientError::protocol("get", path, "broken"));
            }
            Ok(self.urls.get(path).cloned().flatten())
        }
    }

    /// Collects submitted tasks and whether each was already recorded.
    struct Recorder {
        store: Arc<ProgressStore>,
        seen: Mutex<Vec<(DownloadTask, bool)>>,
    }

    #[async_trait]
    impl TaskHandler for Recorder {
        async fn handle(&self, task: DownloadTask) {
            let recorded = self.store.contains(&task.relative_path).await;
            self.seen.lock().unwrap().push((task, recorded));
        }
    }

    fn abc_tree() -> FakeTree {
        FakeTree::default()
            .dir("/", vec![RemoteItem::file("A"), RemoteItem::dir("B")])
            .dir("/B", vec![RemoteItem::file("C"), RemoteItem::file("D")])
            .url("/A", Some("https://cdn/a"))
            .url("/B/C", Some("https://cdn/c"))
            .url("/B/D", Some("https://cdn/d"))
    }

    async fn run(tree: &FakeTree, store: Arc<ProgressStore>) -> (CrawlStats, Vec<(DownloadTask, bool)>) {
        let recorder = Arc::new(Recorder {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut scheduler = Scheduler::new(recorder.clone(), 2);
        let stats = Crawler::new(tree, &store).crawl("/", &mut scheduler).await;
        scheduler.shutdown().await;
        let seen = std::mem::take(&mut *recorder.seen.lock().unwrap());
        (stats, seen)
    }

    async fn store_in(dir: &std::path::Path) -> Arc<ProgressStore> {
        Arc::new(ProgressStore::load(ExportPaths::in_dir(dir)).await.unwrap())
    }

    #[tokio::test]
    async fn records_every_file_in_traversal_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let tree = abc_tree();

        let (stats, seen) = run(&tree, store.clone()).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["A", "B/C", "B/D"]);
        assert_eq!(snapshot["B/C"], "https://cdn/c");
        assert_eq!(stats.recorded, 3);
        assert_eq!(stats.directories, 2);
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, recorded)| *recorded));
    }

    #[tokio::test]
    async fn second_run_resolves_and_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tree = abc_tree();
        run(&tree, store_in(dir.path()).await).await;
        let resolves_after_first = tree.resolve_count();

        let (stats, seen) = run(&tree, store_in(dir.path()).await).await;

        assert_eq!(tree.resolve_count(), resolves_after_first);
        assert!(seen.is_empty());
        assert_eq!(stats.already_recorded, 3);
        assert_eq!(stats.recorded, 0);
    }

    #[tokio::test]
    async fn unresolved_file_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FakeTree::default()
            .dir("/", vec![RemoteItem::file("A"), RemoteItem::file("M")])
            .url("/A", Some("https://cdn/a"))
            .url("/M", None);

        let (stats, _) = run(&tree, store_in(dir.path()).await).await;
        assert_eq!(stats.unresolved, 1);
        let text = std::fs::read_to_string(dir.path().join("results.txt")).unwrap();
        assert!(!text.contains("M ->"));

        let tree = tree.url("/M", Some("https://cdn/m"));
        let store = store_in(dir.path()).await;
        let (stats, seen) = run(&tree, store.clone()).await;
        assert_eq!(stats.recorded, 1);
        assert_eq!(seen[0].0, DownloadTask::new("https://cdn/m", "M"));
        assert!(store.contains("M").await);
    }

    #[tokio::test]
    async fn empty_directory_ends_branch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let tree = FakeTree::default().dir("/", vec![RemoteItem::dir("E")]);

        let (stats, seen) = run(&tree, store.clone()).await;

        assert!(store.is_empty().await);
        assert!(seen.is_empty());
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.directories, 2);
    }

    #[tokio::test]
    async fn failures_skip_only_the_bad_item() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let tree = FakeTree::default()
            .dir(
                "/",
                vec![
                    RemoteItem::dir("bad"),
                    RemoteItem::file("X"),
                    RemoteItem::file("Y"),
                ],
            )
            .broken("/bad")
            .broken("/X")
            .url("/Y", Some("https://cdn/y"));

        let (stats, _) = run(&tree, store.clone()).await;

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.recorded, 1);
        assert!(store.contains("Y").await);
    }

    #[tokio::test]
    async fn persist_failure_still_submits_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ProgressStore::load(ExportPaths::in_dir(&dir.path().join("no-such-dir")))
                .await
                .unwrap(),
        );
        let tree = FakeTree::default()
            .dir("/", vec![RemoteItem::file("A"), RemoteItem::dir("B"), RemoteItem::file("Z")])
            .dir("/B", vec![RemoteItem::file("C")])
            .url("/A", Some("https://cdn/a"))
            .url("/B/C", Some("https://cdn/c"))
            .url("/Z", Some("https://cdn/z"));

        let (stats, seen) = run(&tree, store.clone()).await;

        assert_eq!(stats.recorded, 3);
        assert_eq!(stats.failed, 0);
        let paths: Vec<_> = seen.iter().map(|(t, _)| t.relative_path.as_str()).collect();
        assert_eq!(paths.len(), 3);
        for path in ["A", "B/C", "Z"] {
            assert!(paths.contains(&path));
        }
        assert!(seen.iter().all(|(_, recorded)| *recorded));
        assert_eq!(store.len().await, 3);
        assert!(!dir.path().join("no-such-dir").exists());
    }

    #[tokio::test]
    async fn subdirectory_finishes_before_later_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let tree = FakeTree::default()
            .dir("/", vec![RemoteItem::dir("X"), RemoteItem::file("Y")])
            .dir("/X", vec![RemoteItem::dir("Z"), RemoteItem::file("W")])
            .dir("/X/Z", vec![RemoteItem::file("V")])
            .url("/X/Z/V", Some("u1"))
            .url("/X/W", Some("u2"))
            .url("/Y", Some("u3"));

        run(&tree, store.clone()).await;

        let keys: Vec<_> = store.snapshot().await.into_keys().collect();
        assert_eq!(keys, vec!["X/Z/V", "X/W", "Y"]);
    }

    #[tokio::test]
    async fn deep_tree_walks_without_recursion() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let mut tree = FakeTree::default();
        let mut path = String::from("/");
        for _ in 0..2000 {
            tree = tree.dir(&path, vec![RemoteItem::dir("d")]);
            path = join_remote(&path, "d");
        }
        tree = tree
            .dir(&path, vec![RemoteItem::file("leaf")])
            .url(&join_remote(&path, "leaf"), Some("u"));

        let (stats, _) = run(&tree, store.clone()).await;

        assert_eq!(stats.recorded, 1);
        assert_eq!(stats.directories, 2001);
    }

    #[tokio::test]
    async fn nonstandard_root_uses_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let tree = FakeTree::default()
            .dir("/share", vec![RemoteItem::file("A")])
            .url("/share/A", Some("u"));

        let recorder = Arc::new(Recorder {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut scheduler = Scheduler::new(recorder, 1);
        Crawler::new(&tree, &store).crawl("/share", &mut scheduler).await;
        scheduler.shutdown().await;

        assert!(store.contains("A").await);
    }
}
