//! Error types for s3-mirror
//!
//! - `ConfigError`: invalid or missing settings, raised before any network call
//! - `StoreError`: failures reported by the remote object store
//! - `DownloadError`: failures while materializing a single object locally
//! - `MirrorError`: what a whole run ends with

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for a mirror run
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listing failed; no partial-listing recovery is attempted
    #[error("Listing aborted: {0}")]
    Listing(#[source] StoreError),

    /// First download failure under the strict policy
    #[error("Download of '{key}' failed: {source}")]
    Download {
        key: String,
        #[source]
        source: DownloadError,
    },

    #[error("Interrupted before all objects were downloaded")]
    Interrupted,

    #[error("Download worker panicked: {0}")]
    Worker(String),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bucket needs to be specified")]
    MissingBucket,

    #[error("Invalid concurrency {count}: must be between 1 and {max}")]
    InvalidConcurrency { count: usize, max: usize },

    #[error("Invalid chunk size {size}: must be between 1 and {max} bytes")]
    InvalidChunkSize { size: usize, max: usize },

    #[error("Invalid queue depth 0: omit the flag for an unbounded queue")]
    InvalidQueueDepth,

    #[error("Invalid page size {size}: must be between 1 and {max}")]
    InvalidPageSize { size: i32, max: i32 },

    #[error("--access-key-id and --secret-access-key must be given together")]
    PartialCredentials,
}

/// Errors from the remote object store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("failed to get a page of s3://{bucket}/{prefix}: {reason}")]
    List {
        bucket: String,
        prefix: String,
        reason: String,
    },

    #[error("failed to get body of s3://{bucket}/{key}: {reason}")]
    Fetch {
        bucket: String,
        key: String,
        reason: String,
    },
}

/// Errors while downloading one object
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("refusing to write key '{key}': {reason}")]
    UnsafeKey { key: String, reason: &'static str },

    #[error(transparent)]
    Fetch(#[from] StoreError),

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file {}: {source}", .path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read body of '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download of '{key}' cancelled")]
    Cancelled { key: String },
}

impl DownloadError {
    /// Cancellation is a consequence of another failure or a shutdown, not a failure of its own
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_errors_name_the_failing_path() {
        let err = DownloadError::CreateFile {
            path: PathBuf::from("dir/y.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to create file dir/y.txt: denied");
    }

    #[test]
    fn mirror_error_wraps_download_failure_with_key() {
        let err = MirrorError::Download {
            key: "x.txt".to_string(),
            source: DownloadError::Cancelled {
                key: "x.txt".to_string(),
            },
        };
        assert!(err.to_string().starts_with("Download of 'x.txt' failed"));
    }
}
