//! s3-mirror - download every object under an S3 prefix into a local directory tree
//!
//! The [`lister`] pages through the bucket listing, the [`download`] pool
//! streams each object to disk with a fixed number of workers, and
//! [`mirror::run`] wires the two together.

pub mod config;
pub mod download;
pub mod error;
pub mod lister;
pub mod mirror;
pub mod providers;

pub use config::{CliArgs, FailurePolicy, MirrorConfig, S3Settings};
pub use error::{ConfigError, DownloadError, MirrorError, StoreError};
pub use mirror::{run, FailedKey, MirrorReport};
pub use providers::{AwsStore, MemoryStore, ObjectStore};
