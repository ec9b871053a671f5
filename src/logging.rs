//! Console logging
//!
//! File pipelines run concurrently and all report progress through
//! `tracing`. The subscriber writes through one `Mutex<Stderr>`, so each
//! event is written whole and lines from different files never interleave.

use crate::error::{SyncError, SyncResult};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the verbosity flag when set.
pub fn init(verbose: bool) -> SyncResult<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive(verbose).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(Mutex::new(std::io::stderr()))
        .try_init()
        .map_err(|e| SyncError::ConfigError(format!("Failed to initialize logging: {}", e)))
}
