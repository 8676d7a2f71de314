//! Connectivity cropper.
//!
//! The connectivity log holds one Wi-Fi probe per line:
//!
//! ```text
//! <time> <ap-mac> <signal-dbm> <bitrate> <retries> <freq-ghz> <rx-bytes> <tx-bytes>
//! ```
//!
//! Probes are grouped into fixed windows of `group_size` consecutive samples
//! and each complete window becomes one [`ConnectivityRecord`]. A trailing
//! incomplete window is left unreported.
//!
//! Byte and retry counters are assumed to grow monotonically inside a window.
//! A counter reset (reboot, driver reload) shows up as a negative delta; it is
//! reported as is.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeTuple, Serializer};
use tracing::debug;

use crate::croplog::{CropError, Cropper};
use crate::logline::parse_timestamp;

/// Samples per aggregation window
pub const DEFAULT_GROUP_SIZE: usize = 12;

/// Seconds between two consecutive samples, used for throughput
pub const DEFAULT_THROUGHPUT_WINDOW_SECS: u64 = 300;

/// Minimum number of fields in a sample line
const SAMPLE_FIELDS: usize = 8;

/// One parsed probe line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivitySample {
    pub time: f64,
    pub ap_mac: String,
    pub signal: f64,
    pub bitrate: f64,
    pub retries: i64,
    pub frequency: f64,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
}

impl ConnectivitySample {
    /// Parse a probe line; `None` if it has too few or non-numeric fields.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() < SAMPLE_FIELDS {
            return None;
        }

        Some(Self {
            time: parse_timestamp(fields[0])?,
            ap_mac: fields[1].to_string(),
            signal: fields[2].parse().ok()?,
            bitrate: fields[3].parse().ok()?,
            retries: fields[4].parse().ok()?,
            frequency: fields[5].parse().ok()?,
            rx_bytes: fields[6].parse().ok()?,
            tx_bytes: fields[7].parse().ok()?,
        })
    }
}

/// Aggregate of one window of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityRecord {
    /// Unix time of the first sample in the window
    pub window_start_time: i64,

    /// Most frequent access point; ties go to the one seen first
    pub dominant_ap_mac: String,

    pub median_signal: f64,
    pub median_bitrate: f64,

    /// Retry counter growth over the window
    pub retry_delta: i64,

    /// Frequency of the first sample
    pub frequency: f64,

    /// Median receive throughput in bits per second; `None` for single-sample windows
    pub median_rx_bps: Option<f64>,

    /// Median transmit throughput in bits per second; `None` for single-sample windows
    pub median_tx_bps: Option<f64>,

    pub rx_byte_delta: i64,
    pub tx_byte_delta: i64,
}

impl Serialize for ConnectivityRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_tuple(10)?;
        row.serialize_element(&self.window_start_time)?;
        row.serialize_element(&self.dominant_ap_mac)?;
        row.serialize_element(&self.median_signal)?;
        row.serialize_element(&self.median_bitrate)?;
        row.serialize_element(&self.retry_delta)?;
        row.serialize_element(&self.frequency)?;
        row.serialize_element(&self.median_rx_bps)?;
        row.serialize_element(&self.median_tx_bps)?;
        row.serialize_element(&self.rx_byte_delta)?;
        row.serialize_element(&self.tx_byte_delta)?;
        row.end()
    }
}

/// Cropper for the connectivity log.
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityCropper {
    group_size: usize,
    throughput_window_secs: u64,
}

impl Default for ConnectivityCropper {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            throughput_window_secs: DEFAULT_THROUGHPUT_WINDOW_SECS,
        }
    }
}

impl ConnectivityCropper {
    /// Build a cropper for a given sampling cadence.
    ///
    /// # Errors
    ///
    /// Returns `CropError::Config` if either parameter is zero.
    pub fn new(group_size: usize, throughput_window_secs: u64) -> Result<Self, CropError> {
        if group_size == 0 {
            return Err(CropError::Config(
                "connectivity group size must be greater than 0".to_string(),
            ));
        }
        if throughput_window_secs == 0 {
            return Err(CropError::Config(
                "throughput window must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            group_size,
            throughput_window_secs,
        })
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn throughput_window_secs(&self) -> u64 {
        self.throughput_window_secs
    }

    fn aggregate(&self, group: &[ConnectivitySample]) -> Option<ConnectivityRecord> {
        let (first, last) = (group.first()?, group.last()?);

        let macs: Vec<&str> = group.iter().map(|s| s.ap_mac.as_str()).collect();
        let signals: Vec<f64> = group.iter().map(|s| s.signal).collect();
        let bitrates: Vec<f64> = group.iter().map(|s| s.bitrate).collect();

        let (rxs, txs): (Vec<f64>, Vec<f64>) = group
            .windows(2)
            .map(|pair| {
                (
                    bps(pair[1].rx_bytes - pair[0].rx_bytes, self.throughput_window_secs) as f64,
                    bps(pair[1].tx_bytes - pair[0].tx_bytes, self.throughput_window_secs) as f64,
                )
            })
            .unzip();

        Some(ConnectivityRecord {
            window_start_time: first.time.floor() as i64,
            dominant_ap_mac: most_frequent(&macs)?.to_string(),
            median_signal: median(&signals)?,
            median_bitrate: median(&bitrates)?,
            retry_delta: last.retries - first.retries,
            frequency: first.frequency,
            median_rx_bps: median(&rxs),
            median_tx_bps: median(&txs),
            rx_byte_delta: last.rx_bytes - first.rx_bytes,
            tx_byte_delta: last.tx_bytes - first.tx_bytes,
        })
    }
}

impl Cropper for ConnectivityCropper {
    type Output = Vec<ConnectivityRecord>;

    fn crop(&self, lines: &[String]) -> Result<Self::Output, CropError> {
        Ok(connectivity_crop(lines, self))
    }
}

/// Crop probe lines into one record per complete window.
pub fn connectivity_crop<S: AsRef<str>>(
    lines: &[S],
    cropper: &ConnectivityCropper,
) -> Vec<ConnectivityRecord> {
    let samples: Vec<ConnectivitySample> = lines
        .iter()
        .filter_map(|raw| {
            let sample = ConnectivitySample::parse(raw.as_ref());
            if sample.is_none() {
                debug!(line = raw.as_ref(), "Skipping malformed connectivity line");
            }
            sample
        })
        .collect();

    let groups = samples.chunks_exact(cropper.group_size);
    let leftover = groups.remainder().len();
    if leftover > 0 {
        debug!(
            leftover = leftover,
            group_size = cropper.group_size,
            "Incomplete connectivity window left unreported"
        );
    }

    groups.filter_map(|group| cropper.aggregate(group)).collect()
}

/// Statistical median; the mean of the two middle values for even lengths.
pub fn median(numbers: &[f64]) -> Option<f64> {
    if numbers.is_empty() {
        return None;
    }

    let mut sorted = numbers.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let middle = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        Some((sorted[middle - 1] + sorted[middle]) / 2.0)
    } else {
        Some(sorted[middle])
    }
}

/// Most frequent word. Among equally frequent words the first one in `words`
/// wins.
pub fn most_frequent<'a>(words: &[&'a str]) -> Option<&'a str> {
    let mut frequencies: HashMap<&str, usize> = HashMap::new();
    for &word in words {
        *frequencies.entry(word).or_insert(0) += 1;
    }

    let highest = *frequencies.values().max()?;
    words
        .iter()
        .copied()
        .find(|word| frequencies.get(word) == Some(&highest))
}

/// Bits per second for `byte_delta` bytes moved in `seconds`, rounded down.
pub fn bps(byte_delta: i64, seconds: u64) -> i64 {
    (byte_delta * 8).div_euclid(seconds.max(1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC_A: &str = "4C:72:B9:3C:4B:D3";
    const MAC_B: &str = "00-B0-D0-86-BB-F7";

    fn sample_lines(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                format!(
                    "{} {} -{} 54 {} 2.437 {} {}",
                    1394741000 + i * 300,
                    MAC_A,
                    50 + i % 5,
                    i * 2,
                    1_000_000 + i * 1500,
                    500_000 + i * 300
                )
            })
            .collect()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[5.0, 2.0, 4.0, 3.0, 1.0]), Some(3.0));
        assert_eq!(median(&[5.0, 2.0, 4.0, 3.0, 1.0, 6.0]), Some(3.5));
        assert_eq!(
            median(&[-44.0, -50.0, -66.0, -67.0, -59.0, -63.0, -60.0]),
            Some(-60.0)
        );
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_most_frequent() {
        assert_eq!(most_frequent(&[MAC_A, MAC_A, MAC_B]), Some(MAC_A));
        // Tie: first occurrence wins
        assert_eq!(most_frequent(&[MAC_B, MAC_A, MAC_A, MAC_B]), Some(MAC_B));
        assert_eq!(most_frequent(&[MAC_A, MAC_B, MAC_B, MAC_A]), Some(MAC_A));
        assert_eq!(most_frequent(&[]), None);
    }

    #[test]
    fn test_bps() {
        assert_eq!(bps(415998466 - 415853561, 300), 3864);
        assert_eq!(bps(1, 1), 8);
        assert_eq!(bps(0, 300), 0);
        // Rounds down, also below zero
        assert_eq!(bps(-1, 300), -1);
    }

    #[test]
    fn test_sample_parse() {
        let sample = ConnectivitySample::parse(
            "1394741000 4C:72:B9:3C:4B:D3 -61 54 12 2.437 415853561 21034",
        )
        .unwrap();
        assert_eq!(sample.ap_mac, MAC_A);
        assert_eq!(sample.signal, -61.0);
        assert_eq!(sample.retries, 12);
        assert_eq!(sample.rx_bytes, 415853561);

        assert!(
            ConnectivitySample::parse("1394741000 4C:72:B9:3C:4B:D3 -61 54 12 2.437 1").is_none()
        );
        assert!(ConnectivitySample::parse("1394741000 4C:72 -61 fast 12 2.437 1 2").is_none());
    }

    #[test]
    fn test_two_full_windows() {
        let lines = sample_lines(24);
        let data = ConnectivityCropper::default().crop(&lines).unwrap();
        assert_eq!(data.len(), 2);

        for (n, record) in data.iter().enumerate() {
            let first = ConnectivitySample::parse(&lines[n * 12]).unwrap();
            let last = ConnectivitySample::parse(&lines[n * 12 + 11]).unwrap();
            assert_eq!(record.rx_byte_delta, last.rx_bytes - first.rx_bytes);
            assert_eq!(record.tx_byte_delta, last.tx_bytes - first.tx_bytes);
            assert_eq!(record.window_start_time, first.time as i64);
        }

        let record = &data[0];
        assert_eq!(record.dominant_ap_mac, MAC_A);
        assert_eq!(record.median_signal, -51.5);
        assert_eq!(record.median_bitrate, 54.0);
        assert_eq!(record.retry_delta, 22);
        assert_eq!(record.frequency, 2.437);
        assert_eq!(record.median_rx_bps, Some(40.0));
        assert_eq!(record.median_tx_bps, Some(8.0));
        assert_eq!(record.rx_byte_delta, 16500);
        assert_eq!(record.tx_byte_delta, 3300);
    }

    #[test]
    fn test_incomplete_window_dropped() {
        let lines = sample_lines(23);
        let data = ConnectivityCropper::default().crop(&lines).unwrap();
        assert_eq!(data.len(), 1);

        assert!(ConnectivityCropper::default()
            .crop(&sample_lines(11))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_lines_do_not_count() {
        let mut lines = sample_lines(12);
        lines.insert(4, "1394741900 truncated".to_string());
        let data = ConnectivityCropper::default().crop(&lines).unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_counter_reset_propagates_negative_delta() {
        let mut lines = sample_lines(12);
        lines[6] = format!("1394742800 {} -50 54 0 2.437 10 10", MAC_A);
        let data = ConnectivityCropper::default().crop(&lines).unwrap();
        assert_eq!(data.len(), 1);
        assert!(data[0].rx_byte_delta > 0);
        assert!(data[0].retry_delta > 0);

        let mut lines = sample_lines(12);
        lines[11] = format!("1394744300 {} -50 54 0 2.437 10 10", MAC_A);
        let data = ConnectivityCropper::default().crop(&lines).unwrap();
        assert!(data[0].rx_byte_delta < 0);
        assert!(data[0].tx_byte_delta < 0);
        assert_eq!(data[0].retry_delta, 0);
    }

    #[test]
    fn test_configurable_cadence() {
        let cropper = ConnectivityCropper::new(6, 600).unwrap();
        let data = cropper.crop(&sample_lines(12)).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].median_rx_bps, Some(20.0));

        let single = ConnectivityCropper::new(1, 300).unwrap();
        let data = single.crop(&sample_lines(2)).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].median_rx_bps, None);

        assert!(ConnectivityCropper::new(0, 300).is_err());
        assert!(ConnectivityCropper::new(12, 0).is_err());
    }

    #[test]
    fn test_dominant_mac_in_window() {
        let mut lines = sample_lines(12);
        for line in lines.iter_mut().take(7) {
            *line = line.replace(MAC_A, MAC_B);
        }
        let data = ConnectivityCropper::default().crop(&lines).unwrap();
        assert_eq!(data[0].dominant_ap_mac, MAC_B);
    }

    #[test]
    fn test_record_serializes_nulls() {
        let data = ConnectivityCropper::new(1, 300)
            .unwrap()
            .crop(&sample_lines(1))
            .unwrap();
        let json = serde_json::to_value(&data).unwrap();
        assert!(json[0][6].is_null());
        assert!(json[0][7].is_null());
        assert_eq!(json[0][1], MAC_A);
    }
}
