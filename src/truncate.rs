//! Post-harvest log truncation.
//!
//! After an upload succeeds, every harvested log is rewritten so that only
//! the lines describing a still-open event survive. Retained lines are
//! written back byte for byte; nothing is re-serialized.
//!
//! Truncation must follow a crop of the same lines. [`crate::croplog::CropLog`]
//! enforces that; the free functions here trust their caller.

use std::path::Path;

use tracing::debug;

use crate::connectivity::ConnectivitySample;
use crate::croplog::CropError;
use crate::logline::event_token;

/// Which lines of a log outlive a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncatePolicy {
    /// Keep everything after the last END
    Session,

    /// Keep the last line if it is a pending ACTIVATE
    Activity,

    /// Keep the trailing incomplete window of `group_size` samples
    Connectivity { group_size: usize },
}

/// Lines that must survive truncation under `policy`.
pub fn retained_lines<S: AsRef<str>>(policy: TruncatePolicy, lines: &[S]) -> &[S] {
    match policy {
        TruncatePolicy::Session => {
            match lines
                .iter()
                .rposition(|line| event_token(line.as_ref()) == Some("END"))
            {
                Some(last_end) => &lines[last_end + 1..],
                None => lines,
            }
        }
        TruncatePolicy::Activity => {
            if keeps_last_line(lines) {
                &lines[lines.len() - 1..]
            } else {
                &[]
            }
        }
        TruncatePolicy::Connectivity { group_size } => {
            // Windows are counted over parseable samples only, like the cropper does
            let samples: Vec<usize> = lines
                .iter()
                .enumerate()
                .filter(|(_, line)| ConnectivitySample::parse(line.as_ref()).is_some())
                .map(|(position, _)| position)
                .collect();
            let leftover = samples.len() % group_size.max(1);
            if leftover == 0 {
                &[]
            } else {
                &lines[samples[samples.len() - leftover]..]
            }
        }
    }
}

/// Whether the last line of an activity log is an ACTIVATE still waiting for
/// its DEACTIVATE.
pub fn keeps_last_line<S: AsRef<str>>(lines: &[S]) -> bool {
    lines
        .last()
        .and_then(|line| event_token(line.as_ref()))
        .is_some_and(|event| event == "ACTIVATE")
}

/// Rewrite `path` so it contains exactly `retained`, one per line.
///
/// A log that does not exist is left alone.
pub async fn truncate<S: AsRef<str>>(path: &Path, retained: &[S]) -> Result<(), CropError> {
    let io_error = |source: std::io::Error| CropError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !tokio::fs::try_exists(path).await.map_err(io_error)? {
        debug!(path = %path.display(), "Nothing to truncate");
        return Ok(());
    }

    let mut contents = String::new();
    for line in retained {
        contents.push_str(line.as_ref());
        contents.push('\n');
    }

    tokio::fs::write(path, contents).await.map_err(io_error)
}
