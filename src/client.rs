//! HTTP client for uploading harvest payloads.
//!
//! The collection server takes a single POST of the JSON payload,
//! authenticated with an `x-api-key` header. Transient failures are retried
//! with exponential backoff.

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-api-key";

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Errors that can occur while uploading.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed
    Request(reqwest::Error),

    /// Server returned an error status code
    Status { code: StatusCode, message: String },

    /// All retry attempts exhausted
    RetriesExhausted { attempts: u32, last_error: String },

    /// Request timeout
    Timeout,

    /// Client configuration error
    Config(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Request(e) => write!(f, "HTTP request failed: {}", e),
            ClientError::Status { code, message } => {
                write!(f, "Server error ({}): {}", code, message)
            }
            ClientError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "All {} retry attempts exhausted. Last error: {}",
                    attempts, last_error
                )
            }
            ClientError::Timeout => write!(f, "Request timed out"),
            ClientError::Config(e) => write!(f, "Client configuration error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Request(err)
        }
    }
}

/// Uploads harvest payloads to the collection server.
///
/// # Example
///
/// ```no_run
/// use harvest_collector::client::HarvestClient;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let client = HarvestClient::with_settings(
///         "http://harvest.example/rpc/store",
///         "secret",
///         Duration::from_secs(60),
///         3,
///     )
///     .expect("Failed to create client");
///
///     match client.send("[]".to_string()).await {
///         Ok(status) => println!("Uploaded: {}", status),
///         Err(e) => eprintln!("Failed to send: {}", e),
///     }
/// }
/// ```
pub struct HarvestClient {
    /// The underlying HTTP client
    client: Client,

    /// Collection endpoint
    url: String,

    api_key: HeaderValue,

    /// Maximum number of retry attempts
    max_retries: u32,

    /// Request timeout duration
    timeout: Duration,
}

impl HarvestClient {
    /// Create a client for the server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the endpoint or API key is missing,
    /// or the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let (url, api_key) = config
            .server()
            .ok_or_else(|| ClientError::Config("server URL or API key not set".to_string()))?;

        Self::with_settings(url, api_key, config.request_timeout, config.max_retries)
    }

    /// Create a client with explicit settings.
    pub fn with_settings(
        url: impl Into<String>,
        api_key: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ClientError> {
        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|_| ClientError::Config("API key is not a valid header value".to_string()))?;
        api_key.set_sensitive(true);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
            max_retries,
            timeout,
        })
    }

    /// Upload a serialized payload.
    ///
    /// Retries up to `max_retries` times on connection errors, timeouts,
    /// 5xx and 429 responses. Other 4xx responses fail immediately.
    pub async fn send(&self, body: String) -> Result<StatusCode, ClientError> {
        debug!(bytes = body.len(), url = %self.url, "Uploading harvest");

        let mut last_error: Option<ClientError> = None;
        let mut attempt = 0;

        while attempt <= self.max_retries {
            if attempt > 0 {
                let delay = self.calculate_backoff_delay(attempt);
                warn!(
                    attempt = attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis(),
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_request(body.clone()).await {
                Ok(status) => {
                    info!(status = %status, "Harvest uploaded");
                    return Ok(status);
                }
                Err(e) => {
                    let is_retryable = self.is_retryable_error(&e);

                    if is_retryable && attempt < self.max_retries {
                        warn!(
                            error = %e,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Upload failed, will retry"
                        );
                        last_error = Some(e);
                        attempt += 1;
                    } else {
                        error!(
                            error = %e,
                            attempts = attempt + 1,
                            retryable = is_retryable,
                            "Upload failed permanently"
                        );
                        return Err(e);
                    }
                }
            }
        }

        let last_error_msg = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());

        Err(ClientError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error: last_error_msg,
        })
    }

    /// Send a single HTTP request without retry logic.
    async fn send_request(&self, body: String) -> Result<StatusCode, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(API_KEY_HEADER, self.api_key.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(ClientError::Status {
            code: status,
            message,
        })
    }

    /// Backoff delay for a retry attempt:
    /// min(base_delay * 2^attempt + jitter, max_delay)
    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = DEFAULT_BASE_DELAY_MS.saturating_mul(1 << attempt.min(10));

        // Up to 25% jitter
        let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);

        let total_delay = exponential_delay
            .saturating_add(jitter)
            .min(MAX_RETRY_DELAY_MS);

        Duration::from_millis(total_delay)
    }

    fn is_retryable_error(&self, error: &ClientError) -> bool {
        match error {
            ClientError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ClientError::Timeout => true,
            ClientError::Status { code, .. } => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::RetriesExhausted { .. } => false,
            ClientError::Config(_) => false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
