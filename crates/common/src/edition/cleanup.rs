//! Removal of orphaned upload files
//!
//! Cleanup never fails the operation that triggered it. A file that cannot
//! be removed is logged and counted. In background mode it gets its own retry
//! task with exponential backoff, so one stuck file never holds up the queue.

use crate::config::{CleanupConfig, CleanupMode};
use backoff::ExponentialBackoff;
use futures::future::join_all;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// What happened to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    /// Nothing on disk; already gone
    Missing,
    /// Key does not resolve inside the base directory
    Skipped,
    Failed,
}

impl CleanupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupOutcome::Removed => "removed",
            CleanupOutcome::Missing => "missing",
            CleanupOutcome::Skipped => "skipped",
            CleanupOutcome::Failed => "failed",
        }
    }
}

/// Tally of a batch removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub missing: usize,
    pub skipped: usize,
    /// Keys whose removal failed
    pub failed: Vec<String>,
}

impl CleanupReport {
    fn record(&mut self, key: &str, outcome: CleanupOutcome) {
        match outcome {
            CleanupOutcome::Removed => self.removed += 1,
            CleanupOutcome::Missing => self.missing += 1,
            CleanupOutcome::Skipped => self.skipped += 1,
            CleanupOutcome::Failed => self.failed.push(key.to_string()),
        }
    }
}

/// Deletes files addressed by storage key under a fixed base directory.
#[derive(Debug, Clone)]
pub struct CleanupExecutor {
    base_dir: PathBuf,
}

impl CleanupExecutor {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Filesystem location of a storage key, or `None` if it would escape
    /// the base directory.
    pub fn resolve(&self, key: &str) -> Option<PathBuf> {
        let key = key.trim();
        if key.is_empty() || key.contains("://") {
            return None;
        }

        let relative = Path::new(key);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        confined.then(|| self.base_dir.join(relative))
    }

    /// Remove the file behind `key`. Never returns an error.
    pub async fn remove(&self, key: &str) -> CleanupOutcome {
        let outcome = self.try_remove(key).await;
        crate::metrics::record_file_removal(outcome.as_str());
        outcome
    }

    async fn try_remove(&self, key: &str) -> CleanupOutcome {
        let Some(path) = self.resolve(key) else {
            warn!(key = %key, "Refusing to remove key outside storage directory");
            return CleanupOutcome::Skipped;
        };

        match tokio::fs::try_exists(&path).await {
            Ok(false) => {
                debug!(key = %key, "File already gone");
                return CleanupOutcome::Missing;
            }
            Ok(true) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Could not stat file for removal");
                return CleanupOutcome::Failed;
            }
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, path = %path.display(), "File removed");
                CleanupOutcome::Removed
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CleanupOutcome::Missing,
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "File removal failed");
                CleanupOutcome::Failed
            }
        }
    }

    /// Remove many keys concurrently.
    pub async fn remove_all(&self, keys: &[String]) -> CleanupReport {
        let outcomes = join_all(keys.iter().map(|key| self.remove(key))).await;

        let mut report = CleanupReport::default();
        for (key, outcome) in keys.iter().zip(outcomes) {
            report.record(key, outcome);
        }
        report
    }
}

/// Detached worker that removes keys and retries failures.
#[derive(Debug, Clone)]
pub struct CleanupQueue {
    sender: mpsc::Sender<Vec<String>>,
}

impl CleanupQueue {
    /// Start the worker. It exits once every queue handle is dropped.
    pub fn spawn(executor: Arc<CleanupExecutor>, config: &CleanupConfig) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Vec<String>>(config.queue_capacity.max(1));
        let policy = RetryPolicy::from(config);

        let handle = tokio::spawn(async move {
            info!("Cleanup worker started");
            let mut retries = JoinSet::new();
            loop {
                tokio::select! {
                    batch = receiver.recv() => {
                        let Some(keys) = batch else { break };
                        let report = executor.remove_all(&keys).await;
                        log_report(&report);
                        for key in report.failed {
                            let executor = executor.clone();
                            retries.spawn(async move { remove_with_retry(&executor, &key, &policy).await });
                        }
                    }
                    Some(_) = retries.join_next(), if !retries.is_empty() => {}
                }
            }

            if !retries.is_empty() {
                info!(pending = retries.len(), "Waiting for cleanup retries");
            }
            while retries.join_next().await.is_some() {}
            info!("Cleanup worker stopped");
        });

        (Self { sender }, handle)
    }

    /// Queue keys without waiting. Returns the keys back if the queue is
    /// full or the worker is gone.
    pub fn enqueue(&self, keys: Vec<String>) -> std::result::Result<(), Vec<String>> {
        self.sender.try_send(keys).map_err(|e| match e {
            mpsc::error::TrySendError::Full(keys) | mpsc::error::TrySendError::Closed(keys) => keys,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    initial: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
}

impl From<&CleanupConfig> for RetryPolicy {
    fn from(config: &CleanupConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_backoff_ms),
            max_interval: Duration::from_millis(config.max_backoff_ms),
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }
}

/// Retry a key that already failed once. Returns whether it is gone.
async fn remove_with_retry(executor: &CleanupExecutor, key: &str, policy: &RetryPolicy) -> bool {
    let backoff = ExponentialBackoff {
        initial_interval: policy.initial,
        current_interval: policy.initial,
        max_interval: policy.max_interval,
        max_elapsed_time: Some(policy.max_elapsed),
        ..Default::default()
    };

    let result = backoff::future::retry(backoff, || async {
        crate::metrics::record_cleanup_retry();
        match executor.remove(key).await {
            CleanupOutcome::Failed => Err(backoff::Error::transient(())),
            _ => Ok(()),
        }
    })
    .await;

    if result.is_err() {
        error!(key = %key, "Giving up on orphaned file after retries");
    }
    result.is_ok()
}

/// How the lifecycle hands off orphaned keys.
#[derive(Debug, Clone)]
pub enum Cleanup {
    Inline(Arc<CleanupExecutor>),
    Queued {
        queue: CleanupQueue,
        executor: Arc<CleanupExecutor>,
    },
}

impl Cleanup {
    /// Build from config. In background mode the worker's handle is returned
    /// so the caller can await it on shutdown.
    pub fn from_config(base_dir: impl Into<PathBuf>, config: &CleanupConfig) -> (Self, Option<JoinHandle<()>>) {
        let executor = Arc::new(CleanupExecutor::new(base_dir));
        match config.mode {
            CleanupMode::Inline => (Cleanup::Inline(executor), None),
            CleanupMode::Background => {
                let (queue, handle) = CleanupQueue::spawn(executor.clone(), config);
                (Cleanup::Queued { queue, executor }, Some(handle))
            }
        }
    }

    pub fn executor(&self) -> &CleanupExecutor {
        match self {
            Cleanup::Inline(executor) | Cleanup::Queued { executor, .. } => executor,
        }
    }

    /// Hand off orphaned keys. Inline mode removes them before returning;
    /// queued mode falls back to inline removal if the queue is unavailable.
    pub async fn dispatch(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }

        match self {
            Cleanup::Inline(executor) => log_report(&executor.remove_all(&keys).await),
            Cleanup::Queued { queue, executor } => {
                if let Err(keys) = queue.enqueue(keys) {
                    warn!(count = keys.len(), "Cleanup queue unavailable, removing inline");
                    log_report(&executor.remove_all(&keys).await);
                }
            }
        }
    }

    /// Remove keys now, whatever the mode.
    pub async fn remove_now(&self, keys: &[String]) -> CleanupReport {
        let report = self.executor().remove_all(keys).await;
        log_report(&report);
        report
    }
}

fn log_report(report: &CleanupReport) {
    if report.failed.is_empty() {
        debug!(
            removed = report.removed,
            missing = report.missing,
            skipped = report.skipped,
            "Cleanup finished"
        );
    } else {
        warn!(
            removed = report.removed,
            failed = ?report.failed,
            "Cleanup left orphaned files behind"
        );
    }
}
