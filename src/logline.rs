//! Line parser shared by every cropper.
//!
//! Harvested logs are plain text, one record per line, fields separated by
//! whitespace. The first field is always a Unix timestamp (integer or float
//! seconds), the second an event keyword, and whatever follows is the event
//! payload.

/// A single tokenized log line.
///
/// Borrows from the raw line; nothing is copied until a cropper decides it
/// needs to keep a field.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine<'a> {
    /// Timestamp in (possibly fractional) seconds since the epoch
    pub time: f64,

    /// Event keyword, e.g. `START_SUGAR` or `ACTIVATE`
    pub event: &'a str,

    /// Remaining whitespace-separated fields
    pub payload: Vec<&'a str>,
}

impl<'a> LogLine<'a> {
    /// Tokenize a raw line.
    ///
    /// Returns `None` for lines that cannot be records: no separator, no
    /// event keyword, or a first field that is not a number.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let mut fields = raw.split_whitespace();
        let time = parse_timestamp(fields.next()?)?;
        let event = fields.next()?;

        Some(Self {
            time,
            event,
            payload: fields.collect(),
        })
    }

    /// Timestamp truncated to whole seconds.
    pub fn seconds(&self) -> i64 {
        self.time.floor() as i64
    }

    /// Payload fields joined back with single spaces.
    ///
    /// Application names may contain spaces ("Google Chrome").
    pub fn payload_text(&self) -> String {
        self.payload.join(" ")
    }
}

/// Parse a timestamp field. Accepts `1394741547` as well as `1394741547.25`.
pub fn parse_timestamp(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// Event keyword of a raw line, without parsing the timestamp.
///
/// The truncation policy works on raw lines and only needs this token.
pub fn event_token(raw: &str) -> Option<&str> {
    raw.split_whitespace().nth(1)
}
