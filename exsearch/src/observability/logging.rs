//! Subscriber setup for the `tracing` events the crate emits.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::errors::ConfigError;

/// Filter used when none is configured and `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives. Empty defers to `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Include the event target in each line.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

fn default_with_target() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
            with_target: default_with_target(),
        }
    }
}

impl LoggingConfig {
    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builds the filter.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if self.filter.trim().is_empty() {
            return Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)));
        }
        EnvFilter::try_new(&self.filter)
            .map_err(|e| ConfigError::invalid("logging.filter", e.to_string()))
    }

    /// Checks that the filter parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.env_filter().map(|_| ())
    }
}

/// Installs the global fmt subscriber.
///
/// Fails with [`ConfigError::Subscriber`] when one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| ConfigError::Subscriber(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_json() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "info");
        assert!(config.with_target);
        assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = LoggingConfig::default().with_filter("exsearch=loudest");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "logging.filter"));

        assert!(LoggingConfig::default()
            .with_filter("warn,exsearch::coordination=debug")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default().with_filter("off");
        let _ = init_tracing(&config);
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Subscriber(_)));
    }
}
