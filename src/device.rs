//! Laptop and learner metadata sent along with the cropped logs.
//!
//! This is read from well-known files on the device and from configuration;
//! the croppers never look at it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeTuple, Serializer};
use tracing::debug;

use crate::config::Config;

/// Where the device exposes its identity.
#[derive(Debug, Clone)]
pub struct DevicePaths {
    /// Serial number on ARM laptops
    pub arm_serial: PathBuf,

    /// Serial number on x86 laptops
    pub x86_serial: PathBuf,

    /// OS build identifier
    pub build: PathBuf,

    /// Touched on every OS update; only its mtime matters
    pub updated_stamp: PathBuf,
}

impl Default for DevicePaths {
    fn default() -> Self {
        Self {
            arm_serial: PathBuf::from("/ofw/serial-number/serial-number"),
            x86_serial: PathBuf::from("/proc/device-tree/serial-number"),
            build: PathBuf::from("/boot/olpc_build"),
            updated_stamp: PathBuf::from("/var/lib/misc/last_os_update.stamp"),
        }
    }
}

/// Laptop block of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Laptop {
    pub serial_number: Option<String>,
    pub uuid: Option<String>,
    pub model: Option<String>,
    pub update_version: Option<String>,
    pub build: Option<String>,

    /// Unix time of the last OS update
    pub updated: Option<i64>,

    /// Unix time the collection window ends
    pub collected: Option<i64>,
}

impl Laptop {
    /// Read laptop identity from `paths`.
    ///
    /// Missing or unreadable files leave the matching field empty. Vendor
    /// specific fields (uuid, model, update version) are not probed.
    pub async fn probe(paths: &DevicePaths, collected: Option<i64>) -> Self {
        let serial_number = match read_trimmed(&paths.arm_serial).await {
            Some(serial) => Some(serial),
            None => read_trimmed(&paths.x86_serial).await,
        };

        Self {
            serial_number,
            build: read_trimmed(&paths.build).await,
            updated: modified_at(&paths.updated_stamp).await,
            collected,
            ..Self::default()
        }
    }
}

// Serialized positionally:
// [serial_number, uuid, model, update_version, build, updated, collected]
impl Serialize for Laptop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_tuple(7)?;
        row.serialize_element(&self.serial_number)?;
        row.serialize_element(&self.uuid)?;
        row.serialize_element(&self.model)?;
        row.serialize_element(&self.update_version)?;
        row.serialize_element(&self.build)?;
        row.serialize_element(&self.updated)?;
        row.serialize_element(&self.collected)?;
        row.end()
    }
}

/// Learner block of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Learner {
    pub age: Option<i64>,
    pub gender: Option<String>,
}

impl Learner {
    pub fn from_config(config: &Config) -> Self {
        Self {
            age: config.learner_age,
            gender: config.learner_gender.clone(),
        }
    }
}

// Serialized as [age, gender]; unknown values become 0 and ""
impl Serialize for Learner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_tuple(2)?;
        row.serialize_element(&self.age.unwrap_or(0))?;
        row.serialize_element(self.gender.as_deref().unwrap_or(""))?;
        row.end()
    }
}

/// File contents without trailing NULs and newlines; `None` if missing or blank.
async fn read_trimmed(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let text = text.trim_end_matches(['\0', '\n']);
            (!text.is_empty()).then(|| text.to_string())
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Device file unavailable");
            None
        }
    }
}

async fn modified_at(path: &Path) -> Option<i64> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp())
}
