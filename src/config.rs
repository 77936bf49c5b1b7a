//! Configuration types for s3-mirror
//!
//! - `CliArgs`: command-line flags (clap derive)
//! - `MirrorConfig`: validated settings for the list/download pipeline
//! - `S3Settings`: settings for building the S3 client

use crate::download::QueueDepth;
use crate::error::ConfigError;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_CONCURRENCY: usize = 100;

/// Maximum reasonable worker count
pub const MAX_CONCURRENCY: usize = 4096;

/// Copy buffer size per worker
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Keys requested per listing page (the S3 maximum)
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// What a run does when a single key fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure
    #[default]
    Strict,
    /// Keep downloading the remaining keys and report failures at the end
    Lenient,
}

/// Download every object under a bucket prefix into a local directory tree
#[derive(Parser, Debug, Clone)]
#[command(
    name = "s3-mirror",
    version,
    about = "Download every object under an S3 prefix into a mirrored local directory tree",
    after_help = "EXAMPLES:\n    \
        s3-mirror --bucket my-bucket\n    \
        s3-mirror --bucket my-bucket --prefix logs/2024/ --concurrency 32 -o ./mirror\n    \
        s3-mirror --bucket media --endpoint-url http://localhost:9000 --force-path-style"
)]
pub struct CliArgs {
    /// S3 bucket to download files from
    #[arg(long, value_name = "BUCKET")]
    pub bucket: String,

    /// Prefix used to filter which files to download
    #[arg(long, default_value = "", value_name = "PREFIX")]
    pub prefix: String,

    /// Number of concurrent download workers
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_name = "NUM")]
    pub concurrency: usize,

    /// Directory the object keys are written under
    #[arg(short = 'o', long = "dest", default_value = ".", value_name = "DIR")]
    pub dest: PathBuf,

    /// Bytes copied per read/write while streaming an object
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "BYTES")]
    pub chunk_size: usize,

    /// Keys buffered between the lister and the workers (unbounded if not set)
    #[arg(long, value_name = "NUM")]
    pub queue_depth: Option<usize>,

    /// Keys requested per listing page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_name = "NUM")]
    pub page_size: i32,

    /// Failure policy: abort on the first failure, or continue and report
    #[arg(long = "on-error", value_enum, default_value_t = FailurePolicy::Strict)]
    pub on_error: FailurePolicy,

    /// AWS region (defaults to the provider chain)
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores
    #[arg(long, env = "S3_MIRROR_ENDPOINT_URL", value_name = "URL")]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long)]
    pub force_path_style: bool,

    /// Static access key id (requires --secret-access-key)
    #[arg(long, env = "S3_MIRROR_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Static secret access key (requires --access-key-id)
    #[arg(long, env = "S3_MIRROR_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,

    /// Verbose output (per-chunk and listing detail)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated pipeline configuration
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub bucket: String,
    pub prefix: String,
    pub concurrency: usize,
    pub dest: PathBuf,
    pub chunk_size: usize,
    pub queue_depth: QueueDepth,
    pub policy: FailurePolicy,
}

impl MirrorConfig {
    /// Defaults for `bucket`, matching the CLI defaults.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            dest: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_depth: QueueDepth::Unbounded,
            policy: FailurePolicy::Strict,
        }
    }

    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let queue_depth = match args.queue_depth {
            None => QueueDepth::Unbounded,
            Some(0) => return Err(ConfigError::InvalidQueueDepth),
            Some(depth) => QueueDepth::Bounded(depth),
        };

        let config = Self {
            bucket: args.bucket.clone(),
            prefix: args.prefix.clone(),
            concurrency: args.concurrency,
            dest: args.dest.clone(),
            chunk_size: args.chunk_size,
            queue_depth,
            policy: args.on_error,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency {
                count: self.concurrency,
                max: MAX_CONCURRENCY,
            });
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                size: self.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }

        if self.queue_depth == QueueDepth::Bounded(0) {
            return Err(ConfigError::InvalidQueueDepth);
        }

        Ok(())
    }
}

/// Settings for the S3 client
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub credentials: Option<(String, String)>,
    pub page_size: i32,
}

impl S3Settings {
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.page_size < 1 || args.page_size > DEFAULT_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize {
                size: args.page_size,
                max: DEFAULT_PAGE_SIZE,
            });
        }

        let credentials = match (&args.access_key_id, &args.secret_access_key) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            (None, None) => None,
            _ => return Err(ConfigError::PartialCredentials),
        };

        Ok(Self {
            region: args.region.clone(),
            endpoint_url: args.endpoint_url.clone(),
            force_path_style: args.force_path_style,
            credentials,
            page_size: args.page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("s3-mirror").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_match_reference_flags() {
        let args = parse(&["--bucket", "b"]).unwrap();
        let config = MirrorConfig::from_args(&args).unwrap();
        assert_eq!(config.bucket, "b");
        assert_eq!(config.prefix, "");
        assert_eq!(config.concurrency, 100);
        assert_eq!(config.dest, PathBuf::from("."));
        assert_eq!(config.queue_depth, QueueDepth::Unbounded);
        assert_eq!(config.policy, FailurePolicy::Strict);
    }

    #[test]
    fn test_missing_bucket_is_a_usage_error() {
        let err = parse(&["--prefix", "logs/"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let args = parse(&["--bucket", ""]).unwrap();
        assert_eq!(
            MirrorConfig::from_args(&args).unwrap_err(),
            ConfigError::MissingBucket
        );
    }

    #[test]
    fn test_concurrency_bounds() {
        let args = parse(&["--bucket", "b", "-c", "0"]).unwrap();
        assert!(matches!(
            MirrorConfig::from_args(&args),
            Err(ConfigError::InvalidConcurrency { count: 0, .. })
        ));

        let args = parse(&["--bucket", "b", "-c", "2"]).unwrap();
        assert_eq!(MirrorConfig::from_args(&args).unwrap().concurrency, 2);
    }

    #[test]
    fn test_queue_depth_and_policy() {
        let args = parse(&["--bucket", "b", "--queue-depth", "8", "--on-error", "lenient"]).unwrap();
        let config = MirrorConfig::from_args(&args).unwrap();
        assert_eq!(config.queue_depth, QueueDepth::Bounded(8));
        assert_eq!(config.policy, FailurePolicy::Lenient);

        let args = parse(&["--bucket", "b", "--queue-depth", "0"]).unwrap();
        assert_eq!(
            MirrorConfig::from_args(&args).unwrap_err(),
            ConfigError::InvalidQueueDepth
        );
    }

    #[test]
    fn test_credentials_must_be_paired() {
        let args = parse(&["--bucket", "b", "--access-key-id", "AKID"]).unwrap();
        assert_eq!(
            S3Settings::from_args(&args).unwrap_err(),
            ConfigError::PartialCredentials
        );

        let args = parse(&[
            "--bucket",
            "b",
            "--access-key-id",
            "AKID",
            "--secret-access-key",
            "secret",
        ])
        .unwrap();
        let settings = S3Settings::from_args(&args).unwrap();
        assert_eq!(
            settings.credentials,
            Some(("AKID".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_page_size_bounds() {
        let args = parse(&["--bucket", "b", "--page-size", "5000"]).unwrap();
        assert!(matches!(
            S3Settings::from_args(&args),
            Err(ConfigError::InvalidPageSize { size: 5000, .. })
        ));
    }
}
