//! Application usage cropper.
//!
//! Two historical formats of the activity log exist and are selected per log
//! source through [`Dialect`]:
//!
//! - [`Dialect::Simple`] (GNOME application log): `<time> ACTIVATE <name>` and
//!   `<time> DEACTIVATE <name>`. Several applications may be active at once;
//!   each DEACTIVATE closes the matching ACTIVATE by name.
//! - [`Dialect::Rich`] (Sugar activity log): `<time> ACTIVATE <id> <name...>`,
//!   `<time> DEACTIVATE ...` and `<time> START <name>`. Exactly one activity
//!   is in the foreground, so an ACTIVATE implicitly ends the previous one.
//!   `SUSPEND` stops the foreground clock and `RESUME` restarts it for the
//!   same activity.
//!
//! Both produce one [`AppUsageRecord`] per application name. Identities that
//! share a display name are merged: earliest first-seen wins, durations and
//! activation counts add up. Rows come out in order of first appearance.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeTuple, Serializer};
use tracing::debug;

use crate::croplog::{CropError, Cropper};
use crate::logline::LogLine;

/// Aggregated usage of one application over the cropped window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUsageRecord {
    /// Earliest Unix time the application was seen
    pub first_seen: i64,

    /// Foreground seconds, truncated toward zero
    pub total_duration: i64,

    /// Number of ACTIVATE events
    pub activation_count: u64,

    pub app_name: String,
}

// Serialized positionally: [first_seen, total_duration, activation_count, app_name]
impl Serialize for AppUsageRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_tuple(4)?;
        row.serialize_element(&self.first_seen)?;
        row.serialize_element(&self.total_duration)?;
        row.serialize_element(&self.activation_count)?;
        row.serialize_element(&self.app_name)?;
        row.end()
    }
}

/// Line format of an activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `<time> ACTIVATE|DEACTIVATE <name>`
    Simple,

    /// `<time> ACTIVATE <id> <name>`, with START markers and implicit switches
    Rich,
}

/// Cropper for application activity logs.
#[derive(Debug, Clone, Copy)]
pub struct ActivityCropper {
    dialect: Dialect,
}

impl ActivityCropper {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl Cropper for ActivityCropper {
    type Output = Vec<AppUsageRecord>;

    fn crop(&self, lines: &[String]) -> Result<Self::Output, CropError> {
        match self.dialect {
            Dialect::Simple => Ok(simple_crop(lines)),
            Dialect::Rich => rich_crop(lines),
        }
    }
}

/// Identity of an application as written in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AppIdentity {
    app_id: Option<String>,
    app_name: String,
}

impl AppIdentity {
    fn named(app_name: impl Into<String>) -> Self {
        Self {
            app_id: None,
            app_name: app_name.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Usage {
    first_seen: i64,
    seconds: f64,
    activations: u64,
}

/// Per-identity usage, kept in order of first appearance.
#[derive(Debug, Default)]
struct UsageTally {
    index: HashMap<AppIdentity, usize>,
    entries: Vec<(AppIdentity, Usage)>,
}

impl UsageTally {
    /// Usage for `identity`, registering it as first seen at `time`.
    fn seen(&mut self, identity: &AppIdentity, time: f64) -> &mut Usage {
        let position = match self.index.get(identity).copied() {
            Some(position) => position,
            None => {
                self.entries.push((
                    identity.clone(),
                    Usage {
                        first_seen: time.floor() as i64,
                        ..Usage::default()
                    },
                ));
                self.index.insert(identity.clone(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    fn get_mut(&mut self, identity: &AppIdentity) -> Option<&mut Usage> {
        let position = *self.index.get(identity)?;
        Some(&mut self.entries[position].1)
    }

    /// Merge identities sharing a display name into one row each.
    fn into_records(self) -> Vec<AppUsageRecord> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut merged: Vec<(String, Usage)> = Vec::new();

        for (identity, usage) in self.entries {
            match by_name.get(&identity.app_name) {
                Some(&position) => {
                    let row = &mut merged[position].1;
                    row.first_seen = row.first_seen.min(usage.first_seen);
                    row.seconds += usage.seconds;
                    row.activations += usage.activations;
                }
                None => {
                    by_name.insert(identity.app_name.clone(), merged.len());
                    merged.push((identity.app_name, usage));
                }
            }
        }

        merged
            .into_iter()
            .map(|(app_name, usage)| AppUsageRecord {
                first_seen: usage.first_seen,
                total_duration: usage.seconds as i64,
                activation_count: usage.activations,
                app_name,
            })
            .collect()
    }
}

/// Crop a simple-dialect log.
///
/// A DEACTIVATE without an open ACTIVATE for the same name is ignored, as is
/// an ACTIVATE still open at the end of the log (it counts as an activation
/// but contributes no time yet).
pub fn simple_crop<S: AsRef<str>>(lines: &[S]) -> Vec<AppUsageRecord> {
    let mut tally = UsageTally::default();
    let mut partials: HashMap<String, f64> = HashMap::new();

    for raw in lines {
        let raw = raw.as_ref();
        let Some(line) = LogLine::parse(raw) else {
            debug!(line = raw, "Skipping malformed activity line");
            continue;
        };
        if line.payload.is_empty() {
            debug!(line = raw, "Skipping activity line without application");
            continue;
        }
        let app_name = line.payload_text();

        match line.event {
            "ACTIVATE" => {
                tally.seen(&AppIdentity::named(app_name.as_str()), line.time).activations += 1;
                partials.insert(app_name, line.time);
            }
            "DEACTIVATE" => {
                let Some(since) = partials.remove(&app_name) else {
                    debug!(line = raw, "Skipping DEACTIVATE without ACTIVATE");
                    continue;
                };
                if let Some(usage) = tally.get_mut(&AppIdentity::named(app_name)) {
                    usage.seconds += line.time - since;
                }
            }
            _ => {}
        }
    }

    tally.into_records()
}

/// Crop a rich-dialect log.
///
/// # Errors
///
/// Returns `CropError::MissingActivity` when an ACTIVATE line carries no
/// application at all; the log format is corrupt and cropping stops.
pub fn rich_crop<S: AsRef<str>>(lines: &[S]) -> Result<Vec<AppUsageRecord>, CropError> {
    let mut tally = UsageTally::default();
    let mut previous: Option<(AppIdentity, f64)> = None;
    // Foreground activity while the laptop sleeps
    let mut parked: Option<AppIdentity> = None;

    for (number, raw) in lines.iter().enumerate() {
        let raw = raw.as_ref();
        let Some(line) = LogLine::parse(raw) else {
            debug!(line = raw, "Skipping malformed activity line");
            continue;
        };

        match line.event {
            "START" => {
                if line.payload.is_empty() {
                    debug!(line = raw, "Skipping START without application");
                    continue;
                }
                tally.seen(&AppIdentity::named(line.payload_text()), line.time);
            }
            "ACTIVATE" => {
                let Some((app_id, name)) = line.payload.split_first() else {
                    return Err(CropError::MissingActivity {
                        line: number + 1,
                        raw: raw.to_string(),
                    });
                };
                let app_name = if name.is_empty() {
                    app_id.to_string()
                } else {
                    name.join(" ")
                };
                let identity = AppIdentity {
                    app_id: Some(app_id.to_string()),
                    app_name,
                };

                tally.seen(&identity, line.time).activations += 1;
                if let Some((before, since)) = previous.take() {
                    if let Some(usage) = tally.get_mut(&before) {
                        usage.seconds += line.time - since;
                    }
                }
                parked = None;
                previous = Some((identity, line.time));
            }
            "DEACTIVATE" => {
                parked = None;
                let Some((before, since)) = previous.take() else {
                    debug!(line = raw, "Skipping DEACTIVATE without ACTIVATE");
                    continue;
                };
                if let Some(usage) = tally.get_mut(&before) {
                    usage.seconds += line.time - since;
                }
            }
            "SUSPEND" => {
                let Some((before, since)) = previous.take() else {
                    continue;
                };
                if let Some(usage) = tally.get_mut(&before) {
                    usage.seconds += line.time - since;
                }
                parked = Some(before);
            }
            "RESUME" => {
                if let Some(identity) = parked.take() {
                    previous = Some((identity, line.time));
                }
            }
            _ => {}
        }
    }

    Ok(tally.into_records())
}
