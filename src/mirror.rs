//! Mirror orchestration
//!
//! Starts the worker pool, feeds it every key the lister produces, closes
//! the queue once listing is done and waits for the pool to drain. Workers
//! report one outcome per key; under `FailurePolicy::Strict` the first
//! failure cancels the run, under `Lenient` every key is attempted and the
//! failures are returned in the report.

use crate::config::{FailurePolicy, MirrorConfig};
use crate::download::{work_queue, Downloader, DownloadTask, TaskOutcome, TaskSender, WorkerPool};
use crate::error::{DownloadError, MirrorError, StoreError};
use crate::lister::Lister;
use crate::providers::ObjectStore;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Summary of a mirror run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorReport {
    pub bucket: String,
    pub prefix: String,
    pub policy: FailurePolicy,
    /// Keys handed to the worker pool
    pub queued: u64,
    pub downloaded: u64,
    pub bytes: u64,
    /// Tasks stopped by cancellation before they finished
    pub cancelled: u64,
    pub failed: Vec<FailedKey>,
    pub peak_in_flight: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedKey {
    pub key: String,
    pub error: String,
}

impl MirrorReport {
    /// Every queued key was downloaded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0 && self.downloaded == self.queued
    }
}

#[derive(Default)]
struct Collected {
    downloaded: u64,
    bytes: u64,
    cancelled: u64,
    failed: Vec<FailedKey>,
    first_failure: Option<(String, DownloadError)>,
}

/// Mirror every key under `config.prefix` in `config.bucket` into `config.dest`.
///
/// Cancelling `shutdown` stops listing and in-flight downloads promptly and
/// the run ends with `MirrorError::Interrupted`.
pub async fn run<S: ObjectStore>(
    store: Arc<S>,
    config: &MirrorConfig,
    shutdown: CancellationToken,
) -> Result<MirrorReport, MirrorError> {
    config.validate()?;
    let started = Instant::now();
    info!("concurrency: {}", config.concurrency);
    info!(
        "mirror_start: s3://{}/{} -> {}",
        config.bucket,
        config.prefix,
        config.dest.display()
    );

    // Failures cancel this child token; an external shutdown cancels it too
    let cancel = shutdown.child_token();

    let (sender, receiver) = work_queue(config.queue_depth);
    let queue_stats = sender.stats();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let downloader = Arc::new(Downloader::new(
        store.clone(),
        config.bucket.clone(),
        config.dest.clone(),
        config.chunk_size,
    ));
    let pool = WorkerPool::spawn(
        config.concurrency,
        receiver,
        downloader,
        outcome_tx,
        cancel.clone(),
    );
    let pool_stats = pool.stats();

    let lister = Lister::new(store, config.bucket.clone(), config.prefix.clone());
    let (listing_error, collected) = tokio::join!(
        feed_queue(lister, sender, &cancel, config.policy),
        collect_outcomes(outcome_rx, &cancel, config.policy),
    );
    pool.join().await?;

    let report = MirrorReport {
        bucket: config.bucket.clone(),
        prefix: config.prefix.clone(),
        policy: config.policy,
        queued: queue_stats.enqueued(),
        downloaded: collected.downloaded,
        bytes: collected.bytes,
        cancelled: collected.cancelled,
        failed: collected.failed,
        peak_in_flight: pool_stats.peak_in_flight(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        "mirror_done: queued={} dequeued={} pending={} downloaded={} failed={} cancelled={} bytes={} elapsed_ms={}",
        report.queued,
        queue_stats.dequeued(),
        queue_stats.pending(),
        report.downloaded,
        report.failed.len(),
        report.cancelled,
        report.bytes,
        report.elapsed_ms
    );

    if let Some((key, source)) = collected.first_failure {
        return Err(MirrorError::Download { key, source });
    }
    if let Some(e) = listing_error {
        return Err(MirrorError::Listing(e));
    }
    if shutdown.is_cancelled() {
        return Err(MirrorError::Interrupted);
    }
    if !report.failed.is_empty() {
        warn!(
            "mirror_incomplete: {} of {} keys failed",
            report.failed.len(),
            report.queued
        );
    }

    Ok(report)
}

/// Drive the lister and push every key into the queue in listing order.
/// Dropping `sender` on return closes the queue. Returns the listing error,
/// if any.
async fn feed_queue<S: ObjectStore>(
    lister: Lister<S>,
    sender: TaskSender,
    cancel: &CancellationToken,
    policy: FailurePolicy,
) -> Option<StoreError> {
    let keys = lister.keys();
    tokio::pin!(keys);
    let stats = sender.stats();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = keys.next() => next,
        };

        let key = match next {
            Some(Ok(key)) => key,
            Some(Err(e)) => {
                error!("list_failed: {}", e);
                if policy == FailurePolicy::Strict {
                    cancel.cancel();
                }
                return Some(e);
            }
            None => break,
        };

        let task = DownloadTask {
            key,
            seq: stats.enqueued(),
        };
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sender.send(task) => sent,
        };
        if let Err(e) = sent {
            warn!("list_stop: {}", e);
            break;
        }
    }

    debug!("list_done: queued={}", stats.enqueued());
    sender.close();
    None
}

/// Tally worker outcomes until every worker has exited.
async fn collect_outcomes(
    mut outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
    cancel: &CancellationToken,
    policy: FailurePolicy,
) -> Collected {
    let mut collected = Collected::default();

    while let Some(outcome) = outcomes.recv().await {
        match outcome.result {
            Ok(bytes) => {
                collected.downloaded += 1;
                collected.bytes += bytes;
            }
            Err(e) if e.is_cancelled() => collected.cancelled += 1,
            Err(e) => {
                collected.failed.push(FailedKey {
                    key: outcome.key.clone(),
                    error: e.to_string(),
                });
                if policy == FailurePolicy::Strict && collected.first_failure.is_none() {
                    error!("mirror_abort: {} error={}", outcome.key, e);
                    cancel.cancel();
                    collected.first_failure = Some((outcome.key, e));
                }
            }
        }
    }

    collected
}
