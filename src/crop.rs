//! Harvest payload assembly.
//!
//! A [`Crop`] owns one [`CropLog`] per harvested log and stitches their rows
//! together with laptop and learner metadata into the array the collection
//! server expects:
//!
//! ```text
//! [laptop, learner, activities, apps, sessions]            connectivity disabled
//! [laptop, learner, activities, apps, sessions, network]   connectivity enabled
//! ```

use std::io::ErrorKind;

use serde::ser::{Serialize, SerializeTuple, Serializer};
use tracing::{info, warn};

use crate::activity::{ActivityCropper, AppUsageRecord, Dialect};
use crate::config::Config;
use crate::connectivity::{ConnectivityCropper, ConnectivityRecord};
use crate::croplog::{CropError, CropLog};
use crate::device::{DevicePaths, Laptop, Learner};
use crate::session::{SessionCropper, SessionInterval};
use crate::truncate::TruncatePolicy;

/// Everything uploaded by one harvest pass.
#[derive(Debug, Clone)]
pub struct HarvestPayload {
    pub laptop: Laptop,
    pub learner: Learner,

    /// Sugar activity usage
    pub activities: Vec<AppUsageRecord>,

    /// GNOME application usage
    pub apps: Vec<AppUsageRecord>,

    pub sessions: Vec<SessionInterval>,

    /// Present only when connectivity harvesting is enabled
    pub connectivity: Option<Vec<ConnectivityRecord>>,
}

impl Serialize for HarvestPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.connectivity.is_some() { 6 } else { 5 };
        let mut payload = serializer.serialize_tuple(len)?;
        payload.serialize_element(&self.laptop)?;
        payload.serialize_element(&self.learner)?;
        payload.serialize_element(&self.activities)?;
        payload.serialize_element(&self.apps)?;
        payload.serialize_element(&self.sessions)?;
        if let Some(connectivity) = &self.connectivity {
            payload.serialize_element(connectivity)?;
        }
        payload.end()
    }
}

/// The logs harvested in one pass, and what was cropped from them.
pub struct Crop {
    device_paths: DevicePaths,
    learner: Learner,
    end: Option<i64>,
    activities: CropLog<ActivityCropper>,
    apps: CropLog<ActivityCropper>,
    sessions: CropLog<SessionCropper>,
    connectivity: Option<CropLog<ConnectivityCropper>>,
    data: Option<HarvestPayload>,
}

impl Crop {
    /// Prepare a crop of every log named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `CropError::Config` if the connectivity cadence is unusable.
    pub fn new(config: &Config) -> Result<Self, CropError> {
        let (start, end) = (config.collect_start, config.collect_end);

        let connectivity = if config.connectivity_enabled {
            let cropper = ConnectivityCropper::new(
                config.connectivity_group_size,
                config.throughput_window_secs,
            )?;
            Some(CropLog::new(&config.connectivity_log, cropper).with_window(start, end))
        } else {
            None
        };

        Ok(Self {
            device_paths: DevicePaths::default(),
            learner: Learner::from_config(config),
            end,
            activities: CropLog::new(&config.activities_log, ActivityCropper::new(Dialect::Rich))
                .with_window(start, end),
            apps: CropLog::new(&config.apps_log, ActivityCropper::new(Dialect::Simple))
                .with_window(start, end),
            sessions: CropLog::new(&config.sessions_log, SessionCropper).with_window(start, end),
            connectivity,
            data: None,
        })
    }

    /// Read device identity from somewhere other than the usual locations.
    pub fn with_device_paths(mut self, device_paths: DevicePaths) -> Self {
        self.device_paths = device_paths;
        self
    }

    /// Crop every log and probe the device.
    ///
    /// Collecting twice returns the first result; logs are read once per
    /// pass.
    pub async fn collect(&mut self) -> Result<&HarvestPayload, CropError> {
        if let Some(data) = self.data.take() {
            return Ok(self.data.insert(data));
        }

        let collected = self.end.unwrap_or_else(|| chrono::Utc::now().timestamp());
        let laptop = Laptop::probe(&self.device_paths, Some(collected)).await;

        let activities = self.activities.collect().await?.clone();
        let apps = self.apps.collect().await?.clone();
        let sessions = self.sessions.collect().await?.clone();
        let connectivity = match self.connectivity.as_mut() {
            Some(log) => Some(log.collect().await?.clone()),
            None => None,
        };

        info!(
            activities = activities.len(),
            apps = apps.len(),
            sessions = sessions.len(),
            connectivity = ?connectivity.as_ref().map(Vec::len),
            "Collected harvest data"
        );

        Ok(self.data.insert(HarvestPayload {
            laptop,
            learner: self.learner.clone(),
            activities,
            apps,
            sessions,
            connectivity,
        }))
    }

    fn data(&self) -> Result<&HarvestPayload, CropError> {
        self.data.as_ref().ok_or(CropError::NotReady)
    }

    /// Whether anything new was harvested.
    pub fn grown(&self) -> Result<bool, CropError> {
        let data = self.data()?;
        Ok(!data.activities.is_empty() || !data.apps.is_empty() || !data.sessions.is_empty())
    }

    /// Whether the serial number and every learner characteristic is known.
    pub fn characterizable(&self) -> Result<bool, CropError> {
        let data = self.data()?;
        Ok(data.laptop.serial_number.is_some()
            && data.learner.age.is_some()
            && data.learner.gender.is_some())
    }

    /// JSON body of the upload.
    pub fn serialize(&self) -> Result<String, CropError> {
        serde_json::to_string(self.data()?).map_err(|e| CropError::Encode(e.to_string()))
    }

    /// Truncate every cropped log, keeping only still-open events.
    ///
    /// Call only after the payload was accepted by the server.
    pub async fn truncate(&self) -> Result<(), CropError> {
        self.data()?;

        self.sessions.truncate(TruncatePolicy::Session).await?;
        self.activities.truncate(TruncatePolicy::Activity).await?;
        self.apps.truncate(TruncatePolicy::Activity).await?;
        if let Some(log) = &self.connectivity {
            let group_size = log.cropper().group_size();
            log.truncate(TruncatePolicy::Connectivity { group_size }).await?;
        }
        Ok(())
    }
}

/// Whether every harvested log is missing or empty.
///
/// A log that cannot be inspected is not clean; the crop that follows
/// reports the underlying error.
pub async fn logs_are_clean(config: &Config) -> bool {
    for path in [&config.apps_log, &config.activities_log, &config.sessions_log] {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.len() > 0 => return false,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot inspect log");
                return false;
            }
        }
    }
    true
}
