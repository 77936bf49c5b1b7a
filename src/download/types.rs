//! Download task and outcome types

use crate::error::DownloadError;

/// One object key to materialize locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub key: String,
    /// Position of the key in listing order
    pub seq: u64,
}

/// Result of one task, reported by the worker that ran it
#[derive(Debug)]
pub struct TaskOutcome {
    pub key: String,
    /// Bytes written on success
    pub result: Result<u64, DownloadError>,
}
