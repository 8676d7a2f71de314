//! One harvest pass: crop, upload, truncate.
//!
//! Logs are only truncated after the server accepted the upload. Any failure
//! before that point leaves every log exactly as it was, so the next pass
//! sees the same lines again.

use reqwest::StatusCode;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::client::{ClientError, HarvestClient};
use crate::config::Config;
use crate::crop::{logs_are_clean, Crop};
use crate::croplog::CropError;
use crate::device::DevicePaths;

/// Reasons a harvest pass did not upload anything.
#[derive(Debug)]
pub enum HarvestError {
    /// Server URL or API key not configured
    MissingInfo,

    /// Serial number or learner characteristics unknown
    NoCharacteristics,

    /// Nothing was logged since the last harvest
    NothingNew,

    /// Upload failed
    Send(ClientError),

    /// Cropping or truncating a log failed
    Crop(CropError),
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarvestError::MissingInfo => write!(f, "Missing server information"),
            HarvestError::NoCharacteristics => write!(f, "Missing learner characteristics"),
            HarvestError::NothingNew => write!(f, "Nothing new to collect"),
            HarvestError::Send(e) => write!(f, "Could not be collected: {}", e),
            HarvestError::Crop(e) => write!(f, "Could not crop logs: {}", e),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarvestError::Send(e) => Some(e),
            HarvestError::Crop(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientError> for HarvestError {
    fn from(err: ClientError) -> Self {
        HarvestError::Send(err)
    }
}

impl From<CropError> for HarvestError {
    fn from(err: CropError) -> Self {
        HarvestError::Crop(err)
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub pass_id: Uuid,
    pub status: StatusCode,
    pub activities: usize,
    pub apps: usize,
    pub sessions: usize,
    pub connectivity: Option<usize>,
}

/// Runs harvest passes for one configuration.
pub struct Harvester {
    config: Config,
    device_paths: DevicePaths,
}

impl Harvester {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            device_paths: DevicePaths::default(),
        }
    }

    /// Read device identity from somewhere other than the usual locations.
    pub fn with_device_paths(mut self, device_paths: DevicePaths) -> Self {
        self.device_paths = device_paths;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one pass.
    ///
    /// The caller guarantees no other pass runs at the same time.
    pub async fn run(&self) -> Result<HarvestReport, HarvestError> {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!("harvest", pass_id = %pass_id);
        self.run_pass(pass_id).instrument(span).await
    }

    async fn run_pass(&self, pass_id: Uuid) -> Result<HarvestReport, HarvestError> {
        if self.config.server().is_none() {
            return Err(HarvestError::MissingInfo);
        }
        let client = HarvestClient::new(&self.config)?;

        if logs_are_clean(&self.config).await {
            return Err(HarvestError::NothingNew);
        }

        let mut crop = Crop::new(&self.config)?.with_device_paths(self.device_paths.clone());
        let data = crop.collect().await?;
        let (activities, apps, sessions) =
            (data.activities.len(), data.apps.len(), data.sessions.len());
        let connectivity = data.connectivity.as_ref().map(Vec::len);

        if !crop.characterizable()? {
            return Err(HarvestError::NoCharacteristics);
        }
        if !crop.grown()? {
            return Err(HarvestError::NothingNew);
        }

        let status = client.send(crop.serialize()?).await?;
        crop.truncate().await?;

        info!(
            status = %status,
            activities = activities,
            apps = apps,
            sessions = sessions,
            "Harvest pass complete"
        );

        Ok(HarvestReport {
            pass_id,
            status,
            activities,
            apps,
            sessions,
            connectivity,
        })
    }
}
