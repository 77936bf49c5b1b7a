//! Download pipeline: work queue, worker pool and the per-object download routine
//!
//! - Work queue: single producer, many consumers, every task handed to exactly one worker
//! - Worker pool: a fixed number of workers with a completion barrier
//! - Streams each object to disk in bounded chunks; file and body are released per task

mod pool;
mod queue;
mod types;
mod worker;

pub use pool::{PoolStats, WorkerPool};
pub use queue::{work_queue, QueueClosed, QueueDepth, QueueStats, TaskReceiver, TaskSender};
pub use types::{DownloadTask, TaskOutcome};
pub use worker::{local_path, Downloader};
