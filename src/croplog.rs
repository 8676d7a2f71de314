//! Crop orchestration: read a log file once, run a cropper over it, and keep
//! the result around for the rest of the harvest pass.
//!
//! The read is the only I/O a cropper ever depends on. Croppers themselves are
//! pure functions of the line list, so a [`CropLog`] is the single place that
//! knows about paths, missing files, and the crop-then-truncate ordering.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::truncate::{self, TruncatePolicy};

/// Errors raised while cropping or truncating a log.
#[derive(Debug)]
pub enum CropError {
    /// A rich-dialect ACTIVATE line carried no application payload.
    MissingActivity {
        /// 1-based line number within the cropped log
        line: usize,
        /// Raw text of the offending line
        raw: String,
    },

    /// Reading or rewriting a log file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Truncation was requested for a log that was never cropped in this pass
    NotCollected(PathBuf),

    /// The harvest payload was used before it was collected
    NotReady,

    /// A cropper was built with unusable parameters
    Config(String),

    /// The payload could not be encoded as JSON
    Encode(String),
}

impl std::fmt::Display for CropError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CropError::MissingActivity { line, raw } => {
                write!(f, "ACTIVATE without activity at line {}: '{}'", line, raw)
            }
            CropError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            CropError::NotCollected(path) => {
                write!(f, "refusing to truncate {}: log was not cropped", path.display())
            }
            CropError::NotReady => write!(f, "harvest data has not been collected"),
            CropError::Config(e) => write!(f, "invalid cropper configuration: {}", e),
            CropError::Encode(e) => write!(f, "failed to encode harvest data: {}", e),
        }
    }
}

impl std::error::Error for CropError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CropError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A pure function from raw log lines to structured rows.
///
/// Implementations must be deterministic: cropping the same lines twice
/// yields the same output.
pub trait Cropper: Send + Sync {
    /// Structured rows produced by this cropper
    type Output: Serialize + Send + Sync;

    /// Crop an ordered list of raw lines.
    fn crop(&self, lines: &[String]) -> Result<Self::Output, CropError>;
}

/// A log file paired with the cropper that understands it.
///
/// The file is read at most once; later calls to [`CropLog::collect`] return
/// the cached rows. [`CropLog::truncate`] only works after a successful
/// collect, so a log can never be truncated before its content was cropped.
pub struct CropLog<C: Cropper> {
    path: PathBuf,
    cropper: C,
    start: Option<i64>,
    end: Option<i64>,
    lines: Option<Vec<String>>,
    data: Option<C::Output>,
}

impl<C: Cropper> CropLog<C> {
    /// Pair a log path with a cropper.
    pub fn new(path: impl Into<PathBuf>, cropper: C) -> Self {
        Self {
            path: path.into(),
            cropper,
            start: None,
            end: None,
            lines: None,
            data: None,
        }
    }

    /// Attach the collection window this crop belongs to.
    ///
    /// The window is informational; croppers report every line they are
    /// given.
    pub fn with_window(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Read and crop the log, or return the rows cropped earlier.
    ///
    /// A missing file is treated as an empty log.
    pub async fn collect(&mut self) -> Result<&C::Output, CropError> {
        let data = match self.data.take() {
            Some(data) => data,
            None => {
                let lines = read_lines(&self.path).await?;
                let data = self.cropper.crop(&lines)?;
                debug!(
                    path = %self.path.display(),
                    lines = lines.len(),
                    "Cropped log"
                );
                self.lines = Some(lines);
                data
            }
        };

        Ok(self.data.insert(data))
    }

    /// Rewrite the log keeping only the lines `policy` says are still open.
    ///
    /// Returns the number of lines kept.
    ///
    /// # Errors
    ///
    /// Returns `CropError::NotCollected` if [`CropLog::collect`] has not
    /// succeeded on this instance.
    pub async fn truncate(&self, policy: TruncatePolicy) -> Result<usize, CropError> {
        let lines = self
            .lines
            .as_deref()
            .ok_or_else(|| CropError::NotCollected(self.path.clone()))?;

        let retained = truncate::retained_lines(policy, lines);
        truncate::truncate(&self.path, retained).await?;

        info!(
            path = %self.path.display(),
            dropped = lines.len() - retained.len(),
            retained = retained.len(),
            "Truncated log"
        );
        Ok(retained.len())
    }

    /// Raw lines read by the last collect, if any.
    pub fn lines(&self) -> Option<&[String]> {
        self.lines.as_deref()
    }

    pub fn cropper(&self) -> &C {
        &self.cropper
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn window(&self) -> (Option<i64>, Option<i64>) {
        (self.start, self.end)
    }
}

/// Read a log file into trimmed, non-empty lines.
///
/// Missing files yield no lines. Invalid UTF-8 is replaced rather than
/// rejected; the affected line will simply fail to parse.
pub async fn read_lines(path: &Path) -> Result<Vec<String>, CropError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Log file missing, treating as empty");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(CropError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
