//! Bounded pool for download tasks.
//!
//! `submit` waits for a free slot before spawning, so a producer can never
//! run more than `capacity` tasks ahead of the workers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// A file whose URL has been recorded and that still needs its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub relative_path: String,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            relative_path: relative_path.into(),
        }
    }
}

/// Executes one task. Failures are the handler's to report.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: DownloadTask);
}

pub struct Scheduler<H> {
    handler: Arc<H>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    capacity: usize,
}

impl<H: TaskHandler> Scheduler<H> {
    /// A pool running at most `capacity` tasks at once (at least one).
    pub fn new(handler: Arc<H>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handler,
            permits: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a task, waiting while every slot is busy.
    pub async fn submit(&mut self, task: DownloadTask) {
        self.reap_finished();

        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            error!(path = %task.relative_path, "Download pool is closed, dropping task");
            return;
        };

        let handler = self.handler.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            handler.handle(task).await;
        });
    }

    /// Wait for every submitted task to finish.
    pub async fn shutdown(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join_failure(result);
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join_failure(result);
        }
    }
}

fn log_join_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Download task panicked");
    }
}
