//! Configuration module for the harvest collector.
//!
//! Everything is read from environment variables: the collection server,
//! the harvested log locations, the connectivity sampling cadence and the
//! learner metadata that accompanies every upload.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::connectivity::{DEFAULT_GROUP_SIZE, DEFAULT_THROUGHPUT_WINDOW_SECS};

/// Default session launch log
const DEFAULT_SESSIONS_LOG: &str = "/home/olpc/.olpc-launch-stats";

/// Default Sugar activity log (rich dialect)
const DEFAULT_ACTIVITIES_LOG: &str = "/home/olpc/.olpc-sugar-stats";

/// Default GNOME application log (simple dialect)
const DEFAULT_APPS_LOG: &str = "/home/olpc/.olpc-gnome-stats";

/// Default connectivity probe log
const DEFAULT_CONNECTIVITY_LOG: &str = "/home/olpc/.olpc-connectivity";

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default number of retries after a failed upload
const DEFAULT_MAX_RETRIES: u32 = 3;

/// One day of 1-minute samples is the largest window we accept
const MAX_GROUP_SIZE: usize = 1440;

const MAX_THROUGHPUT_WINDOW_SECS: u64 = 86_400;

/// Configuration for the harvest collector.
///
/// All settings can be configured via environment variables:
/// - `HARVEST_API_URL`: collection endpoint
/// - `HARVEST_API_KEY`: value of the `x-api-key` header
/// - `HARVEST_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 60)
/// - `HARVEST_MAX_RETRIES`: retries after a failed upload (default: 3)
/// - `HARVEST_SESSIONS_LOG`, `HARVEST_ACTIVITIES_LOG`, `HARVEST_APPS_LOG`,
///   `HARVEST_CONNECTIVITY_LOG`: log locations
/// - `HARVEST_CONNECTIVITY_ENABLED`: include connectivity records (default: false)
/// - `HARVEST_CONNECTIVITY_GROUP_SIZE`: samples per window (default: 12)
/// - `HARVEST_THROUGHPUT_WINDOW_SECS`: seconds between samples (default: 300)
/// - `HARVEST_LEARNER_AGE`, `HARVEST_LEARNER_GENDER`: learner characteristics
/// - `HARVEST_COLLECT_START`, `HARVEST_COLLECT_END`: collection window (Unix seconds)
#[derive(Debug, Clone)]
pub struct Config {
    /// Collection endpoint; `None` until configured
    pub api_url: Option<String>,

    /// API key sent with every upload; `None` until configured
    pub api_key: Option<String>,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Maximum number of retry attempts for failed uploads
    pub max_retries: u32,

    pub sessions_log: PathBuf,
    pub activities_log: PathBuf,
    pub apps_log: PathBuf,
    pub connectivity_log: PathBuf,

    /// Whether connectivity records are cropped and uploaded
    pub connectivity_enabled: bool,

    /// Samples per connectivity window
    pub connectivity_group_size: usize,

    /// Seconds between two connectivity samples
    pub throughput_window_secs: u64,

    /// Learner age (birth timestamp as stored by the desktop)
    pub learner_age: Option<i64>,

    pub learner_gender: Option<String>,

    /// Start of the collection window, Unix seconds
    pub collect_start: Option<i64>,

    /// End of the collection window, Unix seconds
    pub collect_end: Option<i64>,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Server settings may be absent; a harvest pass reports that as missing
    /// information instead of refusing to start.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric or boolean variable does not parse
    /// or falls outside its allowed range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use harvest_collector::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Sessions log: {}", config.sessions_log.display());
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = non_empty("HARVEST_API_URL")
            .map(|url| url.trim_end_matches('/').to_string());
        let api_key = non_empty("HARVEST_API_KEY");

        let request_timeout = Duration::from_secs(
            parse_var("HARVEST_REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        let max_retries = parse_var("HARVEST_MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES);

        let connectivity_group_size = Self::parse_group_size()?;
        let throughput_window_secs = Self::parse_throughput_window()?;

        Ok(Self {
            api_url,
            api_key,
            request_timeout,
            max_retries,
            sessions_log: path_var("HARVEST_SESSIONS_LOG", DEFAULT_SESSIONS_LOG),
            activities_log: path_var("HARVEST_ACTIVITIES_LOG", DEFAULT_ACTIVITIES_LOG),
            apps_log: path_var("HARVEST_APPS_LOG", DEFAULT_APPS_LOG),
            connectivity_log: path_var("HARVEST_CONNECTIVITY_LOG", DEFAULT_CONNECTIVITY_LOG),
            connectivity_enabled: parse_bool("HARVEST_CONNECTIVITY_ENABLED")?.unwrap_or(false),
            connectivity_group_size,
            throughput_window_secs,
            learner_age: parse_var("HARVEST_LEARNER_AGE")?,
            learner_gender: non_empty("HARVEST_LEARNER_GENDER"),
            collect_start: parse_var("HARVEST_COLLECT_START")?,
            collect_end: parse_var("HARVEST_COLLECT_END")?,
        })
    }

    /// Parse the connectivity group size with validation.
    fn parse_group_size() -> Result<usize, ConfigError> {
        let env_var = "HARVEST_CONNECTIVITY_GROUP_SIZE";
        let Some(size) = parse_var::<usize>(env_var)? else {
            return Ok(DEFAULT_GROUP_SIZE);
        };

        if size < 2 {
            return Err(ConfigError {
                message: "group size must be at least 2".to_string(),
                env_var: Some(env_var.to_string()),
            });
        }

        if size > MAX_GROUP_SIZE {
            return Err(ConfigError {
                message: format!(
                    "group size {} exceeds maximum allowed ({})",
                    size, MAX_GROUP_SIZE
                ),
                env_var: Some(env_var.to_string()),
            });
        }

        Ok(size)
    }

    /// Parse the throughput window with validation.
    fn parse_throughput_window() -> Result<u64, ConfigError> {
        let env_var = "HARVEST_THROUGHPUT_WINDOW_SECS";
        let Some(window) = parse_var::<u64>(env_var)? else {
            return Ok(DEFAULT_THROUGHPUT_WINDOW_SECS);
        };

        if window == 0 {
            return Err(ConfigError {
                message: "throughput window must be greater than 0".to_string(),
                env_var: Some(env_var.to_string()),
            });
        }

        if window > MAX_THROUGHPUT_WINDOW_SECS {
            return Err(ConfigError {
                message: format!(
                    "throughput window {} exceeds maximum ({}s)",
                    window, MAX_THROUGHPUT_WINDOW_SECS
                ),
                env_var: Some(env_var.to_string()),
            });
        }

        Ok(window)
    }

    /// Endpoint and key, when both are configured.
    pub fn server(&self) -> Option<(&str, &str)> {
        Some((self.api_url.as_deref()?, self.api_key.as_deref()?))
    }
}

impl Default for Config {
    /// Configuration with default log locations and no server.
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            sessions_log: PathBuf::from(DEFAULT_SESSIONS_LOG),
            activities_log: PathBuf::from(DEFAULT_ACTIVITIES_LOG),
            apps_log: PathBuf::from(DEFAULT_APPS_LOG),
            connectivity_log: PathBuf::from(DEFAULT_CONNECTIVITY_LOG),
            connectivity_enabled: false,
            connectivity_group_size: DEFAULT_GROUP_SIZE,
            throughput_window_secs: DEFAULT_THROUGHPUT_WINDOW_SECS,
            learner_age: None,
            learner_gender: None,
            collect_start: None,
            collect_end: None,
        }
    }
}

/// Value of `env_var` unless unset or blank.
fn non_empty(env_var: &str) -> Option<String> {
    env::var(env_var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn path_var(env_var: &str, default: &str) -> PathBuf {
    non_empty(env_var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Parse `env_var` if set.
fn parse_var<T: std::str::FromStr>(env_var: &str) -> Result<Option<T>, ConfigError> {
    match non_empty(env_var) {
        Some(value) => value.parse().map(Some).map_err(|_| ConfigError {
            message: format!("'{}' is not a valid number", value),
            env_var: Some(env_var.to_string()),
        }),
        None => Ok(None),
    }
}

fn parse_bool(env_var: &str) -> Result<Option<bool>, ConfigError> {
    match non_empty(env_var).as_deref() {
        Some("1") | Some("true") | Some("yes") => Ok(Some(true)),
        Some("0") | Some("false") | Some("no") => Ok(Some(false)),
        Some(other) => Err(ConfigError {
            message: format!("'{}' is not a valid boolean", other),
            env_var: Some(env_var.to_string()),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that touch process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn remove(key: &str) -> Self {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_url.is_none());
        assert!(config.server().is_none());
        assert_eq!(config.sessions_log, PathBuf::from("/home/olpc/.olpc-launch-stats"));
        assert_eq!(config.connectivity_group_size, 12);
        assert_eq!(config.throughput_window_secs, 300);
        assert_eq!(config.max_retries, 3);
        assert!(!config.connectivity_enabled);
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = env_lock();
        let _guard1 = EnvGuard::remove("HARVEST_API_URL");
        let _guard2 = EnvGuard::remove("HARVEST_CONNECTIVITY_GROUP_SIZE");
        let _guard3 = EnvGuard::remove("HARVEST_THROUGHPUT_WINDOW_SECS");
        let _guard4 = EnvGuard::remove("HARVEST_APPS_LOG");

        let config = Config::from_env().expect("Should load with defaults");
        assert!(config.api_url.is_none());
        assert_eq!(config.apps_log, PathBuf::from("/home/olpc/.olpc-gnome-stats"));
        assert_eq!(config.connectivity_group_size, 12);
        assert_eq!(config.throughput_window_secs, 300);
    }

    #[test]
    fn test_config_from_env_custom_values() {
        let _lock = env_lock();
        let _guard1 = EnvGuard::set("HARVEST_API_URL", "http://harvest.example:9000/rpc/");
        let _guard2 = EnvGuard::set("HARVEST_API_KEY", "secret");
        let _guard3 = EnvGuard::set("HARVEST_CONNECTIVITY_GROUP_SIZE", "6");
        let _guard4 = EnvGuard::set("HARVEST_CONNECTIVITY_ENABLED", "true");
        let _guard5 = EnvGuard::set("HARVEST_LEARNER_AGE", "1262304000");
        let _guard6 = EnvGuard::set("HARVEST_SESSIONS_LOG", "/tmp/sessions");

        let config = Config::from_env().expect("Should load custom values");
        assert_eq!(config.api_url.as_deref(), Some("http://harvest.example:9000/rpc"));
        assert_eq!(
            config.server(),
            Some(("http://harvest.example:9000/rpc", "secret"))
        );
        assert_eq!(config.connectivity_group_size, 6);
        assert!(config.connectivity_enabled);
        assert_eq!(config.learner_age, Some(1262304000));
        assert_eq!(config.sessions_log, PathBuf::from("/tmp/sessions"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let _lock = env_lock();
        let _guard = EnvGuard::set("HARVEST_API_KEY", "   ");
        let config = Config::from_env().unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_group_size() {
        let _lock = env_lock();
        let _guard = EnvGuard::set("HARVEST_CONNECTIVITY_GROUP_SIZE", "a dozen");

        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("not a valid number"));
        assert_eq!(err.env_var.as_deref(), Some("HARVEST_CONNECTIVITY_GROUP_SIZE"));
    }

    #[test]
    fn test_group_size_out_of_range() {
        let _lock = env_lock();
        {
            let _guard = EnvGuard::set("HARVEST_CONNECTIVITY_GROUP_SIZE", "1");
            let err = Config::from_env().unwrap_err();
            assert!(err.message.contains("at least 2"));
        }
        {
            let _guard = EnvGuard::set("HARVEST_CONNECTIVITY_GROUP_SIZE", "5000");
            let err = Config::from_env().unwrap_err();
            assert!(err.message.contains("exceeds maximum"));
        }
    }

    #[test]
    fn test_throughput_window_out_of_range() {
        let _lock = env_lock();
        {
            let _guard = EnvGuard::set("HARVEST_THROUGHPUT_WINDOW_SECS", "0");
            let err = Config::from_env().unwrap_err();
            assert!(err.message.contains("greater than 0"));
        }
        {
            let _guard = EnvGuard::set("HARVEST_THROUGHPUT_WINDOW_SECS", "999999");
            let err = Config::from_env().unwrap_err();
            assert!(err.message.contains("exceeds maximum"));
        }
    }

    #[test]
    fn test_invalid_bool() {
        let _lock = env_lock();
        let _guard = EnvGuard::set("HARVEST_CONNECTIVITY_ENABLED", "maybe");
        let err = Config::from_env().unwrap_err();
        assert!(err.message.contains("not a valid boolean"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError {
            message: "general error".to_string(),
            env_var: None,
        };
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }
}
