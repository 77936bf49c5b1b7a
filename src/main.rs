//! s3-mirror - download every object under an S3 prefix
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use s3_mirror::config::{CliArgs, MirrorConfig, S3Settings};
use s3_mirror::providers::AwsStore;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every listed object was downloaded
async fn run() -> Result<bool> {
    // Exits with a usage message when --bucket is missing
    let args = CliArgs::parse();

    setup_logging(args.verbose);

    // Validate before building a client so bad flags never touch the network
    let config = MirrorConfig::from_args(&args).context("Invalid configuration")?;
    let settings = S3Settings::from_args(&args).context("Invalid configuration")?;

    let store = Arc::new(AwsStore::connect(&settings).await);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let report = s3_mirror::run(store, &config, shutdown)
        .await
        .with_context(|| format!("Failed to mirror s3://{}/{}", config.bucket, config.prefix))?;

    if args.summary_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
    }

    Ok(report.is_complete())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            shutdown.cancel();
        }
    });
}

fn setup_logging(verbose: bool) {
    let default_filter = if verbose {
        "s3_mirror=debug,warn"
    } else {
        "s3_mirror=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
