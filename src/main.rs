//! Harvest Collector - uploads cropped usage logs to a collection server
//!
//! Each invocation runs a single harvest pass: every usage log is cropped,
//! the aggregates are uploaded as one JSON document, and on success the logs
//! are truncated down to the events that are still open. Scheduling is left
//! to whatever starts the binary (cron, a systemd timer, the desktop).
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `HARVEST_API_URL`: collection endpoint
//! - `HARVEST_API_KEY`: API key sent as `x-api-key`
//! - `HARVEST_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 60)
//! - `HARVEST_MAX_RETRIES`: Max retry attempts (default: 3)
//! - `HARVEST_CONNECTIVITY_ENABLED`: also upload Wi-Fi windows (default: false)
//! - `RUST_LOG`: Logging level filter (default: info)
//!
//! See [`harvest_collector::config::Config`] for the full list.
//!
//! ## Exit status
//!
//! - `0`: uploaded, or nothing new to upload
//! - `1`: configuration or crop failure
//! - `2`: upload failed; logs left untouched for the next pass

use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use harvest_collector::config::Config;
use harvest_collector::harvest::{HarvestError, Harvester};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                api_url = ?config.api_url,
                sessions_log = %config.sessions_log.display(),
                connectivity_enabled = config.connectivity_enabled,
                max_retries = config.max_retries,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::from(1);
        }
    };

    match Harvester::new(config).run().await {
        Ok(report) => {
            info!(
                pass_id = %report.pass_id,
                status = %report.status,
                "Successfully collected"
            );
            ExitCode::SUCCESS
        }
        Err(HarvestError::NothingNew) => {
            info!("Nothing new to collect");
            ExitCode::SUCCESS
        }
        Err(e @ HarvestError::Send(_)) => {
            warn!(error = %e, "Upload failed, logs kept for the next pass");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "Harvest failed");
            ExitCode::from(1)
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
