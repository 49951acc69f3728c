//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A startup summary of the effective relay configuration

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config::{self, RelayConfig};

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to create the file or a logger is already installed
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective relay configuration at startup.
pub fn log_startup_configuration(relay: &RelayConfig) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Relay configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("  parse API:        {} (timeout {:?})", relay.parse_api_url, relay.parse_api_timeout);
    log::info!("  extractor pool:   {} instances", relay.pool_capacity);
    log::info!(
        "  scheduler:        {} concurrent jobs (ceiling {}), timeout {:?}",
        relay.max_concurrent_jobs,
        config::scheduler::MAX_CONCURRENCY_CEILING,
        relay.job_timeout
    );
    log::info!(
        "  recovery offers:  max {} entries, ttl {:?}, {} retry rounds",
        relay.recovery_max_entries,
        relay.recovery_ttl,
        relay.recovery_max_rounds
    );
    match relay.proxy_url {
        Some(ref proxy) => log::info!("  proxy:            {}", proxy),
        None => log::info!("  proxy:            disabled"),
    }
    if let Some(ref encoding) = relay.preferred_encoding {
        log::info!("  encoding:         {}", encoding);
    }
    if relay.max_concurrent_jobs > relay.pool_capacity {
        log::warn!(
            "⚠️  MAX_CONCURRENT_JOBS ({}) exceeds EXTRACTOR_POOL_SIZE ({}); extra jobs will wait for extractors",
            relay.max_concurrent_jobs,
            relay.pool_capacity
        );
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
