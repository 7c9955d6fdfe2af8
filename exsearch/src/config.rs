//! Configuration for download coordination, caching and fetching.
//!
//! Values are plain data handed to component constructors. Loading them
//! from the environment or a secrets manager is the embedding service's
//! job; this module only parses JSON and validates ranges.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::download::{FetchOptions, RetryPolicy};
use crate::errors::ConfigError;
use crate::observability::LoggingConfig;
use crate::utils::seconds_to_duration;

/// Largest accepted value for any seconds field (one week).
pub const MAX_SECONDS: f64 = 604_800.0;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExSearchConfig {
    /// Wait-for-downloadable and per-download deadlines.
    #[serde(default)]
    pub download: DownloadConfig,
    /// Content cache policy.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Domain lock store policy.
    #[serde(default)]
    pub domain_lock: DomainLockConfig,
    /// Defaults handed to downloaders.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Remote rendering service, when one is deployed.
    #[serde(default)]
    pub render_api: Option<RenderApiConfig>,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExSearchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Sets the download configuration.
    #[must_use]
    pub fn with_download(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    /// Sets the cache TTL in seconds (0 disables cache writes).
    #[must_use]
    pub fn with_cache_expires(mut self, seconds: u64) -> Self {
        self.cache.expires_seconds = seconds;
        self
    }

    /// Sets the fetch defaults.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Checks every range constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.download.validate()?;
        self.fetch.validate()?;
        self.logging.validate()?;
        if self.domain_lock.ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "domain_lock.ttl_seconds",
                "must be greater than zero",
            ));
        }
        if let Some(ref render) = self.render_api {
            render.validate()?;
        }
        Ok(())
    }
}

fn check_seconds(field: &str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(field, "must be a finite, non-negative number"));
    }
    if !allow_zero && value == 0.0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    if value > MAX_SECONDS {
        return Err(ConfigError::invalid(
            field,
            format!("must not exceed {MAX_SECONDS} seconds"),
        ));
    }
    Ok(())
}

/// Deadlines for the coordination protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Deadline for one downloader call, retries included.
    #[serde(default = "default_timeout_for_each_url")]
    pub timeout_for_each_url_seconds: f64,
    /// Total wait budget while another worker holds the origin.
    #[serde(default = "default_timeout_until_downloadable")]
    pub timeout_until_downloadable_seconds: f64,
    /// Sleep between lock re-reads.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: f64,
}

fn default_timeout_for_each_url() -> f64 {
    60.0
}

fn default_timeout_until_downloadable() -> f64 {
    300.0
}

fn default_poll_interval() -> f64 {
    1.5
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_for_each_url_seconds: default_timeout_for_each_url(),
            timeout_until_downloadable_seconds: default_timeout_until_downloadable(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

impl DownloadConfig {
    /// Creates a download configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wait-for-downloadable budget.
    #[must_use]
    pub fn with_wait_timeout(mut self, seconds: f64) -> Self {
        self.timeout_until_downloadable_seconds = seconds;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, seconds: f64) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    /// Sets the per-URL download deadline.
    #[must_use]
    pub fn with_download_timeout(mut self, seconds: f64) -> Self {
        self.timeout_for_each_url_seconds = seconds;
        self
    }

    /// Wait budget as a Duration.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_until_downloadable_seconds)
    }

    /// Poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        seconds_to_duration(self.poll_interval_seconds)
    }

    /// Per-URL deadline as a Duration.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_for_each_url_seconds)
    }

    /// Checks ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds(
            "download.timeout_for_each_url_seconds",
            self.timeout_for_each_url_seconds,
            false,
        )?;
        check_seconds(
            "download.timeout_until_downloadable_seconds",
            self.timeout_until_downloadable_seconds,
            true,
        )?;
        check_seconds("download.poll_interval_seconds", self.poll_interval_seconds, false)
    }
}

/// Content cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached document. Zero disables cache writes.
    #[serde(default = "default_cache_expires")]
    pub expires_seconds: u64,
}

fn default_cache_expires() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expires_seconds: default_cache_expires(),
        }
    }
}

impl CacheConfig {
    /// Returns the TTL, or `None` when caching is disabled.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        (self.expires_seconds > 0).then(|| Duration::from_secs(self.expires_seconds))
    }
}

/// Domain lock store policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainLockConfig {
    /// Lifetime of a lock record.
    #[serde(default = "default_lock_ttl")]
    pub ttl_seconds: u64,
    /// Drop every lock record when the service starts.
    #[serde(default = "default_true")]
    pub clear_on_startup: bool,
}

fn default_lock_ttl() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for DomainLockConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_lock_ttl(),
            clear_on_startup: default_true(),
        }
    }
}

impl DomainLockConfig {
    /// TTL as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Defaults handed to downloaders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout of one request attempt.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    /// Extra attempts after the first failure.
    #[serde(default)]
    pub max_retries: usize,
    /// Delay between attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: f64,
    /// User agent for direct HTTP fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Redirect limit for direct HTTP fetches.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_request_timeout() -> f64 {
    5.0
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_user_agent() -> String {
    format!("exsearch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            max_retries: 0,
            retry_delay_seconds: default_retry_delay(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl FetchConfig {
    /// Sets the retry budget.
    #[must_use]
    pub fn with_retries(mut self, max_retries: usize, delay_seconds: f64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_seconds = delay_seconds;
        self
    }

    /// Builds the fetch options every route starts from.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new()
            .with_request_timeout(seconds_to_duration(self.request_timeout_seconds))
            .with_retry(RetryPolicy::fixed(
                self.max_retries,
                seconds_to_duration(self.retry_delay_seconds),
            ))
    }

    /// Checks ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds("fetch.request_timeout_seconds", self.request_timeout_seconds, false)?;
        check_seconds("fetch.retry_delay_seconds", self.retry_delay_seconds, true)
    }
}

/// Remote browser-rendering service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderApiConfig {
    /// Base URL; requests go to `<base_url>/download`.
    pub base_url: String,
    /// Timeout of one render request.
    #[serde(default = "default_render_timeout")]
    pub timeout_seconds: f64,
}

fn default_render_timeout() -> f64 {
    30.0
}

impl RenderApiConfig {
    /// Timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_seconds)
    }

    /// Checks the base URL and timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("render_api.base_url", "must not be empty"));
        }
        check_seconds("render_api.timeout_seconds", self.timeout_seconds, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExSearchConfig::default();
        assert_eq!(config.download.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.download.wait_timeout(), Duration::from_secs(300));
        assert_eq!(config.download.download_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(300)));
        assert_eq!(config.domain_lock.ttl(), Duration::from_secs(3600));
        assert!(config.domain_lock.clear_on_startup);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ExSearchConfig::from_json_str(
            r#"{"cache": {"expires_seconds": 0}, "download": {"poll_interval_seconds": 0.5}}"#,
        )
        .unwrap();

        assert_eq!(config.cache.ttl(), None);
        assert_eq!(config.download.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.download.timeout_until_downloadable_seconds, 300.0);
    }

    #[test]
    fn test_rejects_unbounded_or_zero_poll() {
        let err = ExSearchConfig::from_json_str(r#"{"download": {"poll_interval_seconds": 0}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("poll_interval_seconds"));

        let config = ExSearchConfig::new()
            .with_download(DownloadConfig::new().with_wait_timeout(f64::INFINITY));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_seconds() {
        let err = ExSearchConfig::from_json_str(
            r#"{"download": {"timeout_until_downloadable_seconds": 1e20}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout_until_downloadable_seconds"));

        let err = ExSearchConfig::from_json_str(
            r#"{"render_api": {"base_url": "http://render:8080", "timeout_seconds": 1e20}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("render_api.timeout_seconds"));

        let unchecked = DownloadConfig::new().with_wait_timeout(1e20);
        assert_eq!(unchecked.wait_timeout(), Duration::MAX);
        assert_eq!(
            DownloadConfig::new().with_poll_interval(f64::NAN).poll_interval(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_rejects_empty_render_base_url() {
        let err = ExSearchConfig::from_json_str(r#"{"render_api": {"base_url": " "}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("render_api.base_url"));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"fetch": {{"max_retries": 2, "retry_delay_seconds": 0.25}}}}"#
        )
        .unwrap();

        let config = ExSearchConfig::from_json_file(file.path()).unwrap();
        let options = config.fetch.fetch_options();
        assert_eq!(options.retry.max_retries, 2);
        assert_eq!(options.retry.delay, Duration::from_millis(250));
    }
}
