//! Session cropper: folds the launch log into desktop session intervals.
//!
//! The session log records one event per line:
//!
//! ```text
//! 1394741547 START_SUGAR
//! 1394741550 SUSPEND
//! 1394741560 RESUME
//! 1394741570 END
//! ```
//!
//! Every START opens an interval. Time only accumulates while the machine is
//! awake: SUSPEND stops the clock, RESUME restarts it, END closes the
//! interval, even while suspended. An interval still open at the end of the log is reported with
//! whatever duration it has so far, so the next harvest can see it again.

use serde::ser::{Serialize, SerializeTuple, Serializer};
use tracing::debug;

use crate::croplog::{CropError, Cropper};
use crate::logline::LogLine;

/// One desktop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInterval {
    /// Unix time of the START event
    pub start: i64,

    /// Awake seconds accumulated so far; `None` if no SUSPEND or END was seen
    pub duration: Option<i64>,

    /// `true` for Sugar sessions, `false` for GNOME sessions
    pub is_sugar: bool,
}

impl SessionInterval {
    pub fn new(start: i64, duration: Option<i64>, is_sugar: bool) -> Self {
        Self {
            start,
            duration,
            is_sugar,
        }
    }

    fn add(&mut self, seconds: i64) {
        self.duration = Some(self.duration.unwrap_or(0) + seconds);
    }
}

// Serialized positionally: [start, duration, is_sugar]
impl Serialize for SessionInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_tuple(3)?;
        row.serialize_element(&self.start)?;
        row.serialize_element(&self.duration)?;
        row.serialize_element(&self.is_sugar)?;
        row.end()
    }
}

/// Session log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StartSugar,
    StartGnome,
    Resume,
    Suspend,
    End,
}

impl SessionEvent {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "START_SUGAR" => Some(SessionEvent::StartSugar),
            "START_GNOME" => Some(SessionEvent::StartGnome),
            "RESUME" => Some(SessionEvent::Resume),
            "SUSPEND" => Some(SessionEvent::Suspend),
            "END" => Some(SessionEvent::End),
            _ => None,
        }
    }
}

/// Cropper for the session launch log.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCropper;

impl Cropper for SessionCropper {
    type Output = Vec<SessionInterval>;

    fn crop(&self, lines: &[String]) -> Result<Self::Output, CropError> {
        Ok(session_crop(lines))
    }
}

/// Fold session events into intervals, in file order.
pub fn session_crop<S: AsRef<str>>(lines: &[S]) -> Vec<SessionInterval> {
    let mut data = Vec::new();
    let mut current: Option<SessionInterval> = None;
    let mut previous_time: Option<i64> = None;

    for raw in lines {
        let raw = raw.as_ref();
        let Some(line) = LogLine::parse(raw) else {
            debug!(line = raw, "Skipping malformed session line");
            continue;
        };
        let Some(event) = SessionEvent::from_keyword(line.event) else {
            debug!(line = raw, "Skipping unknown session event");
            continue;
        };
        let time = line.seconds();

        match event {
            SessionEvent::StartSugar | SessionEvent::StartGnome => {
                if let Some(open) = current.take() {
                    data.push(open);
                }
                current = Some(SessionInterval::new(
                    time,
                    None,
                    event == SessionEvent::StartSugar,
                ));
                previous_time = Some(time);
            }
            SessionEvent::Resume => {
                previous_time = Some(time);
            }
            SessionEvent::Suspend | SessionEvent::End => {
                let Some(session) = current.as_mut() else {
                    debug!(line = raw, "Skipping close event without an open session");
                    continue;
                };
                match previous_time.take() {
                    Some(since) => session.add(time - since),
                    // Already suspended: a second SUSPEND adds nothing, an END still closes
                    None if event == SessionEvent::Suspend => {
                        debug!(line = raw, "Skipping SUSPEND while suspended");
                        continue;
                    }
                    None => {}
                }

                if event == SessionEvent::End {
                    data.extend(current.take());
                }
            }
        }
    }

    data.extend(current);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truncate::{retained_lines, TruncatePolicy};

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_session_crop_reference_log() {
        let log = lines(&[
            "1394741547 START_SUGAR",
            "1394741550 END",
            "1394741587 START_GNOME",
            "1394741626 START_SUGAR",
            "1394741629 END",
            "1394741683 START_SUGAR",
        ]);

        let data = session_crop(&log);
        assert_eq!(
            data,
            vec![
                SessionInterval::new(1394741547, Some(3), true),
                SessionInterval::new(1394741587, None, false),
                SessionInterval::new(1394741626, Some(3), true),
                SessionInterval::new(1394741683, None, true),
            ]
        );
    }

    #[test]
    fn test_session_crop_serializes_positionally() {
        let data = session_crop(&["100 START_SUGAR", "103 END", "110 START_GNOME"]);
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, "[[100,3,true],[110,null,false]]");
    }

    #[test]
    fn test_suspend_resume_excludes_sleep() {
        let data = session_crop(&[
            "100 START_SUGAR",
            "110 SUSPEND",
            "500 RESUME",
            "520 END",
        ]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(30), true)]);
    }

    #[test]
    fn test_trailing_suspended_session_keeps_partial_duration() {
        let data = session_crop(&["100 START_GNOME", "160 SUSPEND"]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(60), false)]);
    }

    #[test]
    fn test_end_while_suspended_closes_session() {
        let log = ["100 START_SUGAR", "110 SUSPEND", "200 END"];
        assert_eq!(session_crop(&log), vec![SessionInterval::new(100, Some(10), true)]);
        // Closed, so truncation has nothing left to keep
        assert!(retained_lines(TruncatePolicy::Session, &log).is_empty());
    }

    #[test]
    fn test_events_after_suspended_end_belong_to_no_session() {
        let data = session_crop(&[
            "100 START_SUGAR",
            "110 SUSPEND",
            "200 END",
            "300 RESUME",
            "310 END",
        ]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(10), true)]);
    }

    #[test]
    fn test_double_suspend_counts_once() {
        let data = session_crop(&[
            "100 START_GNOME",
            "110 SUSPEND",
            "150 SUSPEND",
            "200 RESUME",
            "205 END",
        ]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(15), false)]);
    }

    #[test]
    fn test_double_end_is_noop() {
        let data = session_crop(&["100 START_SUGAR", "105 END", "107 END"]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(5), true)]);
    }

    #[test]
    fn test_orphan_events_and_malformed_lines_skipped() {
        let data = session_crop(&[
            "90 END",
            "95 SUSPEND",
            "garbage",
            "96",
            "97 REBOOT",
            "100 START_SUGAR",
            "102 END",
        ]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(2), true)]);
    }

    #[test]
    fn test_float_timestamps_truncate() {
        let data = session_crop(&["100.9 START_SUGAR", "103.2 END"]);
        assert_eq!(data, vec![SessionInterval::new(100, Some(3), true)]);
    }

    #[test]
    fn test_one_interval_per_start() {
        let log = [
            "1 START_SUGAR",
            "2 START_GNOME",
            "3 END",
            "4 START_SUGAR",
            "5 SUSPEND",
            "6 RESUME",
            "7 END",
            "8 START_GNOME",
        ];
        let starts = log.iter().filter(|l| l.contains("START")).count();
        assert_eq!(session_crop(&log).len(), starts);
    }

    #[test]
    fn test_cropper_is_idempotent() {
        let log = lines(&["1 START_SUGAR", "4 END", "9 START_GNOME"]);
        let first = SessionCropper.crop(&log).unwrap();
        let second = SessionCropper.crop(&log).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_log() {
        let empty: [&str; 0] = [];
        assert!(session_crop(&empty).is_empty());
    }
}
