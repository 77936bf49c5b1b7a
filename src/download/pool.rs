//! Worker pool - a fixed set of download workers sharing one work queue

use super::queue::TaskReceiver;
use super::types::TaskOutcome;
use super::worker::Downloader;
use crate::error::MirrorError;
use crate::providers::ObjectStore;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Download accounting across all workers
#[derive(Debug, Default)]
pub struct PoolStats {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    started: AtomicU64,
    finished: AtomicU64,
}

impl PoolStats {
    /// Highest number of downloads that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a PoolStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a PoolStats) -> Self {
        stats.started.fetch_add(1, Ordering::SeqCst);
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.finished.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    workers: JoinSet<()>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Start exactly `concurrency` workers. Each pulls tasks from `receiver`
    /// until the queue is closed and drained or `cancel` fires, and reports
    /// one `TaskOutcome` per task on `outcomes`.
    pub fn spawn<S: ObjectStore>(
        concurrency: usize,
        receiver: TaskReceiver,
        downloader: Arc<Downloader<S>>,
        outcomes: mpsc::UnboundedSender<TaskOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        let stats = Arc::new(PoolStats::default());
        let mut workers = JoinSet::new();

        for id in 0..concurrency {
            workers.spawn(run_worker(
                id,
                receiver.clone(),
                downloader.clone(),
                outcomes.clone(),
                cancel.clone(),
                stats.clone(),
            ));
        }
        debug!("pool_started: workers={}", concurrency);

        Self { workers, stats }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Completion barrier: wait for every worker to exit.
    pub async fn join(mut self) -> Result<(), MirrorError> {
        let mut panicked = None;
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                if e.is_panic() && panicked.is_none() {
                    panicked = Some(e.to_string());
                }
            }
        }

        debug!(
            "pool_done: started={} finished={} peak_in_flight={}",
            self.stats.started(),
            self.stats.finished(),
            self.stats.peak_in_flight()
        );
        match panicked {
            Some(message) => Err(MirrorError::Worker(message)),
            None => Ok(()),
        }
    }
}

async fn run_worker<S: ObjectStore>(
    id: usize,
    receiver: TaskReceiver,
    downloader: Arc<Downloader<S>>,
    outcomes: mpsc::UnboundedSender<TaskOutcome>,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let result = {
            let _slot = InFlight::enter(&stats);
            info!("downloading {} seq={}", task.key, task.seq);
            downloader.download(&task.key, &cancel).await
        };

        match &result {
            Ok(bytes) => info!("download_complete: {} bytes={}", task.key, bytes),
            Err(e) if e.is_cancelled() => debug!("download_cancelled: {}", task.key),
            Err(e) => warn!("download_failed: {} error={}", task.key, e),
        }

        if outcomes
            .send(TaskOutcome {
                key: task.key,
                result,
            })
            .is_err()
        {
            break;
        }
    }
    debug!("worker_exit: {}", id);
}
