//! Work queue between the lister and the download workers
//!
//! One `TaskSender` feeds any number of cloned `TaskReceiver`s. Receivers
//! share the underlying channel behind an async mutex, so each task is
//! handed to exactly one worker. Dropping the sender closes the queue;
//! workers drain what is left and then see `None`.

use super::types::DownloadTask;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// How many tasks may sit in the queue before the producer waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDepth {
    /// The producer never waits; queued keys are bounded only by memory
    Unbounded,
    Bounded(usize),
}

/// Every receiver has been dropped; the task is handed back
#[derive(Debug, Error)]
#[error("work queue closed before '{}' could be queued", .0.key)]
pub struct QueueClosed(pub DownloadTask);

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Tasks queued but not yet picked up by a worker
    pub fn pending(&self) -> u64 {
        self.enqueued().saturating_sub(self.dequeued())
    }
}

enum SenderInner {
    Bounded(mpsc::Sender<DownloadTask>),
    Unbounded(mpsc::UnboundedSender<DownloadTask>),
}

enum ReceiverInner {
    Bounded(mpsc::Receiver<DownloadTask>),
    Unbounded(mpsc::UnboundedReceiver<DownloadTask>),
}

impl ReceiverInner {
    async fn recv(&mut self) -> Option<DownloadTask> {
        match self {
            ReceiverInner::Bounded(rx) => rx.recv().await,
            ReceiverInner::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Producer half of the work queue
pub struct TaskSender {
    inner: SenderInner,
    stats: Arc<QueueStats>,
}

/// Consumer half; clone one per worker
#[derive(Clone)]
pub struct TaskReceiver {
    inner: Arc<Mutex<ReceiverInner>>,
    stats: Arc<QueueStats>,
}

/// Create a work queue with the given depth. `Bounded(0)` is treated as `Bounded(1)`.
pub fn work_queue(depth: QueueDepth) -> (TaskSender, TaskReceiver) {
    let (sender, receiver) = match depth {
        QueueDepth::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (SenderInner::Unbounded(tx), ReceiverInner::Unbounded(rx))
        }
        QueueDepth::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (SenderInner::Bounded(tx), ReceiverInner::Bounded(rx))
        }
    };
    let stats = Arc::new(QueueStats::default());

    (
        TaskSender {
            inner: sender,
            stats: stats.clone(),
        },
        TaskReceiver {
            inner: Arc::new(Mutex::new(receiver)),
            stats,
        },
    )
}

impl TaskSender {
    /// Queue a task, waiting for room if the queue is bounded and full.
    pub async fn send(&self, task: DownloadTask) -> Result<(), QueueClosed> {
        match &self.inner {
            SenderInner::Bounded(tx) => tx.send(task).await.map_err(|e| QueueClosed(e.0))?,
            SenderInner::Unbounded(tx) => tx.send(task).map_err(|e| QueueClosed(e.0))?,
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close the queue. Workers finish the remaining tasks, then stop.
    pub fn close(self) {}

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

impl TaskReceiver {
    /// Wait for the next task. `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<DownloadTask> {
        let mut receiver = self.inner.lock().await;
        let task = receiver.recv().await;
        if task.is_some() {
            self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn task(seq: u64) -> DownloadTask {
        DownloadTask {
            key: format!("key-{}", seq),
            seq,
        }
    }

    #[tokio::test]
    async fn close_lets_receivers_drain_in_fifo_order() {
        let (tx, rx) = work_queue(QueueDepth::Unbounded);
        let stats = tx.stats();
        for seq in 0..3 {
            tx.send(task(seq)).await.unwrap();
        }
        tx.close();

        let mut seen = Vec::new();
        while let Some(task) = rx.recv().await {
            seen.push(task.seq);
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(stats.dequeued(), 3);
        assert_eq!(stats.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_task_goes_to_exactly_one_consumer() {
        let (tx, rx) = work_queue(QueueDepth::Bounded(4));
        let stats = tx.stats();

        let mut consumers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let rx = rx.clone();
            consumers.spawn(async move {
                let mut got = Vec::new();
                while let Some(task) = rx.recv().await {
                    got.push(task.seq);
                }
                got
            });
        }
        drop(rx);

        for seq in 0..500 {
            tx.send(task(seq)).await.unwrap();
        }
        tx.close();

        let mut all = Vec::new();
        while let Some(got) = consumers.join_next().await {
            all.extend(got.unwrap());
        }
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(all.len(), 500);
        assert_eq!(unique.len(), 500);
        assert_eq!(stats.enqueued(), 500);
        assert_eq!(stats.dequeued(), 500);
    }

    #[tokio::test]
    async fn send_fails_once_all_receivers_are_gone() {
        let (tx, rx) = work_queue(QueueDepth::Bounded(1));
        drop(rx);
        let err = tx.send(task(7)).await.unwrap_err();
        assert_eq!(err.0.seq, 7);
    }
}
