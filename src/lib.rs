//! Harvest Collector Library
//!
//! Crops the usage logs a laptop writes during the day into compact
//! aggregates and uploads them to a collection server:
//!
//! - **logline**: tokenizer shared by every cropper
//! - **session**: desktop session intervals from the launch log
//! - **activity**: per-application usage, simple and rich log dialects
//! - **connectivity**: Wi-Fi signal and throughput windows
//! - **truncate**: which lines survive a harvest
//! - **croplog**: read-once crop orchestration and the `Cropper` trait
//! - **device**: laptop and learner metadata
//! - **crop**: harvest payload assembly
//! - **client**: HTTP upload with retries
//! - **harvest**: one full crop, upload, truncate pass
//! - **config**: environment-based configuration
//!
//! # Example
//!
//! ```no_run
//! use harvest_collector::config::Config;
//! use harvest_collector::harvest::Harvester;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     match Harvester::new(config).run().await {
//!         Ok(report) => println!("Uploaded with status {}", report.status),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

pub mod activity;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod crop;
pub mod croplog;
pub mod device;
pub mod harvest;
pub mod logline;
pub mod session;
pub mod truncate;

pub use activity::{ActivityCropper, AppUsageRecord, Dialect};
pub use client::{ClientError, HarvestClient};
pub use config::{Config, ConfigError};
pub use connectivity::{ConnectivityCropper, ConnectivityRecord, ConnectivitySample};
pub use crop::{Crop, HarvestPayload};
pub use croplog::{CropError, CropLog, Cropper};
pub use harvest::{HarvestError, HarvestReport, Harvester};
pub use session::{SessionCropper, SessionInterval};
pub use truncate::TruncatePolicy;
